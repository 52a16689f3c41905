//! The commit cell: the single-winner decision object shared by every leaf
//! registered against one synchronization.
//!
//! Backed by a mutex-guarded state machine plus a condvar wakeup rather than
//! a bare atomic, so the channel rendezvous protocol (`crate::channel`) can
//! use the same cell for its two-phase reservation discipline without a
//! second lock. `decided()` still gives a lock-free fast path for callers
//! that only want to observe, never block. The waiter list lives behind the
//! *same* mutex as the state transition itself: registering a waiter and
//! publishing a decision must be mutually exclusive, otherwise a waiter
//! registered concurrently with the decide could be inserted after the
//! decide has already drained the (then-empty) list and never fire.
//!
//! `T: Clone` is required throughout: an `Event<T>` is an immutable value
//! that may be synchronized upon many times, and a commit cell may still be
//! weakly referenced (by a lazily-swept channel offer or timer bucket entry)
//! after `sync` returns its value, so reading the decision clones rather
//! than consumes it.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

static NEXT_PICK_ID: AtomicU64 = AtomicU64::new(1);

type Waiter<T> = Box<dyn FnOnce(T) + Send>;

enum State<T> {
    Undecided,
    /// Owned by exactly one channel rendezvous attempt at a time.
    Reserving,
    Decided(T),
}

struct Inner<T> {
    state: State<T>,
    waiters: HashMap<u64, Waiter<T>>,
}

/// The per-synchronization commit cell. Every leaf of an `Event<T>` tree
/// races to decide the same `Pick<T>`; only the first to succeed wins.
pub struct Pick<T> {
    id: u64,
    inner: Mutex<Inner<T>>,
    cond: Condvar,
    decided: AtomicBool,
    next_waiter_id: AtomicU64,
}

impl<T> fmt::Debug for Pick<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pick")
            .field("id", &self.id)
            .field("decided", &self.decided.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T: Clone + Send> Pick<T> {
    /// Create a fresh, undecided commit cell. Each synchronization needs its
    /// own distinct cell; never pool these across `sync` calls.
    pub fn new() -> Self {
        Self {
            id: NEXT_PICK_ID.fetch_add(1, Ordering::Relaxed),
            inner: Mutex::new(Inner {
                state: State::Undecided,
                waiters: HashMap::new(),
            }),
            cond: Condvar::new(),
            decided: AtomicBool::new(false),
            next_waiter_id: AtomicU64::new(1),
        }
    }

    /// Identity, used only for tracing fields; the reservation protocol
    /// never needs a total order over picks (see `crate::channel`).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Non-blocking observer. `true` once a decision has been made; a
    /// `Reserving` cell still reports `false`.
    pub fn decided(&self) -> bool {
        self.decided.load(Ordering::Acquire)
    }

    /// Attempt the `undecided -> decided(value)` transition. Returns whether
    /// this caller won. Losers must not retry with a different value: the
    /// contract is at-most-one effective call.
    pub fn try_decide(&self, value: T) -> bool {
        let mut guard = self.inner.lock();
        match guard.state {
            State::Undecided => {
                guard.state = State::Decided(value.clone());
                self.publish(guard, value);
                true
            }
            State::Reserving | State::Decided(_) => false,
        }
    }

    /// Take the transient `undecided -> reserving` state used by channel
    /// rendezvous. Only the reserver may `confirm_reserve` or
    /// `release_reserve` afterwards.
    pub(crate) fn try_reserve(&self) -> bool {
        let mut guard = self.inner.lock();
        match guard.state {
            State::Undecided => {
                guard.state = State::Reserving;
                true
            }
            _ => false,
        }
    }

    /// Confirm a held reservation, publishing `value` as the decision.
    pub(crate) fn confirm_reserve(&self, value: T) {
        let mut guard = self.inner.lock();
        debug_assert!(matches!(guard.state, State::Reserving));
        guard.state = State::Decided(value.clone());
        self.publish(guard, value);
    }

    /// Release a held reservation back to `undecided` without deciding.
    pub(crate) fn release_reserve(&self) {
        let mut guard = self.inner.lock();
        debug_assert!(matches!(guard.state, State::Reserving));
        guard.state = State::Undecided;
    }

    /// Called with `inner` already transitioned to `Decided`; drains and
    /// fires waiters, then wakes blocked `wait()` callers.
    fn publish(&self, mut guard: parking_lot::MutexGuard<'_, Inner<T>>, value: T) {
        let waiters: Vec<_> = guard.waiters.drain().collect();
        drop(guard);
        self.decided.store(true, Ordering::Release);
        self.cond.notify_all();
        for (_, waiter) in waiters {
            waiter(value.clone());
        }
    }

    /// Block the current thread until a decision has been made.
    pub fn wait(&self) {
        let mut guard = self.inner.lock();
        while !matches!(guard.state, State::Decided(_)) {
            self.cond.wait(&mut guard);
        }
    }

    /// Return the decided value. Calling before a decision has been made is
    /// a programmer-contract error and panics rather than returning a
    /// sentinel.
    pub fn value(&self) -> T {
        match &self.inner.lock().state {
            State::Decided(v) => v.clone(),
            _ => panic!("Pick::value called before the cell was decided"),
        }
    }

    /// Call `waiter` exactly once with the decided value, immediately if
    /// already decided, or when a decision is later published. Used by
    /// `wrap` and `with_nack` to bridge one commit cell's decision into
    /// another without blocking. Returns a token for `remove_waiter`.
    pub(crate) fn register_waiter(&self, waiter: Waiter<T>) -> u64 {
        let id = self.next_waiter_id.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.inner.lock();
        match &guard.state {
            State::Decided(v) => {
                let v = v.clone();
                drop(guard);
                waiter(v);
            }
            _ => {
                guard.waiters.insert(id, waiter);
            }
        }
        id
    }

    /// Idempotent: no-op if the waiter already fired or was never queued.
    pub(crate) fn remove_waiter(&self, token: u64) {
        self.inner.lock().waiters.remove(&token);
    }
}

impl<T: Clone + Send> Default for Pick<T> {
    fn default() -> Self {
        Self::new()
    }
}
