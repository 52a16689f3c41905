//! Deferred event construction.

use std::sync::Arc;

use super::Event;

/// Defers construction of the real event until registration time. If
/// `thunk` panics, the panic propagates out of `sync` unchanged: nothing
/// has been registered yet at that point, so there is no partial state to
/// tear down.
pub fn guard<T, F>(thunk: F) -> Event<T>
where
    F: Fn() -> Event<T> + Send + Sync + 'static,
{
    Event::Guard(Arc::new(thunk))
}
