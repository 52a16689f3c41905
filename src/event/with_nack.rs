//! Negative-acknowledgement combinator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{Canceller, Event, Leaf};
use crate::pick::Pick;

/// The one-shot cancellation signal handed to a `with_nack` body. Decided
/// iff the branch it guards loses; never decided if the branch wins.
struct NackLeaf {
    nack_pick: Arc<Pick<()>>,
}

impl Leaf<()> for NackLeaf {
    fn try_register(&self, pick: &Arc<Pick<()>>) -> Canceller {
        let forward = pick.clone();
        let token = self
            .nack_pick
            .register_waiter(Box::new(move |()| {
                forward.try_decide(());
            }));
        let nack_pick = self.nack_pick.clone();
        Canceller::new(move || nack_pick.remove_waiter(token))
    }
}

/// Supplies `body` with a fresh nack event and registers the event it
/// returns. If the outer synchronization commits to a different branch,
/// the nack fires (the branch's body can `sync` on it to run cleanup); if
/// this branch wins, the nack never fires.
pub fn with_nack<T, F>(body: F) -> Event<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(Event<()>) -> Event<T> + Send + Sync + 'static,
{
    Event::WithNack(Arc::new(body))
}

pub(super) fn register<T: Clone + Send + Sync + 'static>(
    body: &Arc<dyn Fn(Event<()>) -> Event<T> + Send + Sync>,
    outer_pick: &Arc<Pick<T>>,
) -> Canceller {
    let nack_pick: Arc<Pick<()>> = Arc::new(Pick::new());
    let nack_event = Event::Leaf(Arc::new(NackLeaf {
        nack_pick: nack_pick.clone(),
    }));
    let inner_event = body(nack_event);

    let inner_pick: Arc<Pick<T>> = Arc::new(Pick::new());
    let inner_canceller = inner_event.try_register(&inner_pick);

    let outer_for_waiter = outer_pick.clone();
    let won = Arc::new(AtomicBool::new(false));
    let won_for_waiter = won.clone();
    let waiter_token = inner_pick.register_waiter(Box::new(move |value| {
        if outer_for_waiter.try_decide(value) {
            won_for_waiter.store(true, Ordering::Relaxed);
        }
    }));

    let inner_pick_for_cancel = inner_pick.clone();
    Canceller::new(move || {
        inner_pick_for_cancel.remove_waiter(waiter_token);
        inner_canceller.call();
        if !won.load(Ordering::Relaxed) {
            nack_pick.try_decide(());
        }
    })
}
