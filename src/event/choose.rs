//! Non-deterministic race between children sharing a result type.

use std::sync::Arc;

use super::{Canceller, Event, PartialCancellers};
use crate::pick::Pick;

/// Race between `events`. At least one alternative is required; with
/// exactly one, `choose` is equivalent to that event. When more than one
/// child is simultaneously ready at registration time, the first whose
/// commit attempt succeeds wins: effective left-to-right order, not a
/// documented fairness guarantee beyond "some ready child wins".
pub fn choose<T: Clone + Send + Sync + 'static>(events: Vec<Event<T>>) -> Event<T> {
    assert!(
        !events.is_empty(),
        "choose requires at least one alternative"
    );
    Event::Choose(events)
}

/// Registers every child against the same outer `pick`, in order. If a
/// later child's registration panics, every canceller already collected
/// runs (via `PartialCancellers`'s `Drop`) before the panic continues to
/// unwind out of `sync`.
pub(super) fn register<T: Clone + Send + Sync + 'static>(
    children: &[Event<T>],
    pick: &Arc<Pick<T>>,
) -> Canceller {
    let mut collected = PartialCancellers(Vec::with_capacity(children.len()));
    for child in children {
        let canceller = child.try_register(pick);
        collected.0.push(canceller);
    }
    Canceller::combine(std::mem::take(&mut collected.0))
}
