//! Result-transforming combinator.

use std::sync::Arc;

use super::{Canceller, Event};
use crate::pick::Pick;

/// Transforms the result of `inner` with `f`. Registration creates a fresh
/// inner commit cell, registers `inner` against it, and arranges (via
/// [`Pick::register_waiter`]) for `f`'s result to be offered to the outer
/// pick as soon as the inner cell decides, whether that happens
/// synchronously inside this call (e.g. wrapping `always`) or later, from
/// another thread (e.g. wrapping a channel receive).
pub fn wrap<U, T, F>(inner: Event<U>, f: F) -> Event<T>
where
    U: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    F: Fn(U) -> T + Send + Sync + 'static,
{
    let inner = Arc::new(inner);
    let f = Arc::new(f);
    Event::Wrap(Arc::new(move |outer: &Arc<Pick<T>>| {
        let inner_pick: Arc<Pick<U>> = Arc::new(Pick::new());
        let inner_canceller = inner.try_register(&inner_pick);

        let f = f.clone();
        let outer_for_waiter = outer.clone();
        let waiter_token = inner_pick.register_waiter(Box::new(move |value| {
            outer_for_waiter.try_decide(f(value));
        }));

        let inner_pick_for_cancel = inner_pick.clone();
        Canceller::new(move || {
            inner_pick_for_cancel.remove_waiter(waiter_token);
            inner_canceller.call();
        })
    }))
}
