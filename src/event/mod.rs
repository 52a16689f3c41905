//! The event value model: tagged variants for primitive events and
//! combinators, each exposing the registration contract.
//!
//! `Event<T>` is an immutable description of a potential synchronization; it
//! is not a live resource. A `Canceller` is only ever called once: Rust's
//! `FnOnce` ownership makes a second call a compile error, which is the
//! cheapest possible idempotence guarantee a canceller can offer.

mod choose;
mod guard;
mod with_nack;
mod wrap;

pub use choose::choose;
pub use guard::guard;
pub use with_nack::with_nack;
pub use wrap::wrap;

use std::marker::PhantomData;
use std::sync::Arc;

use crate::pick::Pick;

/// A registration-time cleanup thunk. Removes every trace the owning leaf
/// left behind (queue entries, timer entries) and fires any applicable nack.
/// Consumed exactly once by the synchronization driver.
pub struct Canceller(Box<dyn FnOnce() + Send>);

impl Canceller {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Canceller(Box::new(f))
    }

    /// A canceller with nothing to undo.
    pub fn noop() -> Self {
        Canceller(Box::new(|| {}))
    }

    /// Run every child canceller, in order. Used to compose `choose`.
    pub fn combine(cancellers: Vec<Canceller>) -> Self {
        Canceller(Box::new(move || {
            for c in cancellers {
                c.call();
            }
        }))
    }

    pub fn call(self) {
        (self.0)()
    }
}

/// Ensures cancellers collected so far run if a later sibling's
/// `try_register` panics mid-registration: partial registrations from a
/// failing subtree must be torn down before the panic propagates out of
/// `sync`. On the non-panicking path the caller drains this guard with
/// `std::mem::take` before it drops, so nothing runs twice.
pub(crate) struct PartialCancellers(pub Vec<Canceller>);

impl Drop for PartialCancellers {
    fn drop(&mut self) {
        for c in self.0.drain(..) {
            c.call();
        }
    }
}

/// A leaf's non-blocking registration contract (`Send`, `Recv`, `Timeout`,
/// and anything else with side effects external to the event algebra
/// itself). `Always`/`Never`/`Choose`/`Guard`/`Wrap`/`WithNack` are handled
/// directly by `Event::try_register` instead of going through this trait.
pub trait Leaf<T>: Send + Sync {
    fn try_register(&self, pick: &Arc<Pick<T>>) -> Canceller;
}

/// An immutable description of a potential synchronization action. Build
/// one with the free functions in this crate, then call [`crate::sync`] or
/// [`crate::poll`] to commit to exactly one alternative.
pub enum Event<T> {
    /// Immediately ready; always wins if nothing else already has.
    Always(Arc<dyn Fn() -> T + Send + Sync>),
    /// Never ready.
    Never(PhantomData<T>),
    /// A primitive leaf with externally visible registration side effects.
    Leaf(Arc<dyn Leaf<T>>),
    /// Non-deterministic race between children sharing one result type.
    /// Registration order is preserved and is the only documented
    /// tie-break: the first child whose commit attempt succeeds wins.
    Choose(Vec<Event<T>>),
    /// Deferred construction: the thunk runs at registration time.
    Guard(Arc<dyn Fn() -> Event<T> + Send + Sync>),
    /// Result-transforming combinator, built by [`wrap`].
    Wrap(Arc<dyn Fn(&Arc<Pick<T>>) -> Canceller + Send + Sync>),
    /// Negative-acknowledgement combinator, built by [`with_nack`].
    WithNack(Arc<dyn Fn(Event<()>) -> Event<T> + Send + Sync>),
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        match self {
            Event::Always(f) => Event::Always(f.clone()),
            Event::Never(_) => Event::Never(PhantomData),
            Event::Leaf(l) => Event::Leaf(l.clone()),
            Event::Choose(children) => Event::Choose(children.clone()),
            Event::Guard(g) => Event::Guard(g.clone()),
            Event::Wrap(w) => Event::Wrap(w.clone()),
            Event::WithNack(b) => Event::WithNack(b.clone()),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Event<T> {
    /// Register this event (and recursively, its children) against `pick`.
    /// Non-blocking: may acquire a short-lived mutex or push a queue entry,
    /// but must never suspend the caller.
    pub(crate) fn try_register(&self, pick: &Arc<Pick<T>>) -> Canceller {
        match self {
            Event::Always(make_value) => {
                pick.try_decide(make_value());
                Canceller::noop()
            }
            Event::Never(_) => Canceller::noop(),
            Event::Leaf(leaf) => leaf.try_register(pick),
            Event::Choose(children) => choose::register(children, pick),
            Event::Guard(thunk) => {
                let event = thunk();
                event.try_register(pick)
            }
            Event::Wrap(register) => register(pick),
            Event::WithNack(body) => with_nack::register(body, pick),
        }
    }
}

/// Immediately ready; produces a fresh clone of `v` every time it is
/// synchronized upon. Canceller is a no-op.
pub fn always<T: Clone + Send + Sync + 'static>(v: T) -> Event<T> {
    Event::Always(Arc::new(move || v.clone()))
}

/// Never ready. Canceller is a no-op.
pub fn never<T>() -> Event<T> {
    Event::Never(PhantomData)
}
