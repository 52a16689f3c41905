//! The synchronization drivers: `sync` commits to exactly one ready
//! alternative, blocking if none are yet ready; `poll` never blocks.

use std::sync::Arc;

use crate::event::Event;
use crate::pick::Pick;

/// Register `event`, then block until some alternative commits. Always
/// cancels every other registered alternative before returning, even on the
/// fast path where a child decided during registration itself.
pub fn sync<T: Clone + Send + Sync + 'static>(event: &Event<T>) -> T {
    let pick: Arc<Pick<T>> = Arc::new(Pick::new());
    let canceller = event.try_register(&pick);
    if !pick.decided() {
        pick.wait();
    }
    canceller.call();
    pick.value()
}

/// Register `event` and commit only if an alternative is ready immediately;
/// otherwise cancel every registration and return `None` without blocking.
pub fn poll<T: Clone + Send + Sync + 'static>(event: &Event<T>) -> Option<T> {
    let pick: Arc<Pick<T>> = Arc::new(Pick::new());
    let canceller = event.try_register(&pick);
    let result = if pick.decided() {
        Some(pick.value())
    } else {
        None
    };
    canceller.call();
    result
}
