//! Channel rendezvous: matches send and receive offers under a per-channel
//! mutex, using a two-sided reservation so the commit is atomic across two
//! independent `Pick`s.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::event::{Canceller, Event, Leaf};
use crate::pick::Pick;
use crate::stats::ChannelStats;

static NEXT_OFFER_ID: AtomicU64 = AtomicU64::new(1);

struct SendOffer<T> {
    id: u64,
    pick: Arc<Pick<()>>,
    value: T,
}

struct RecvOffer<T> {
    id: u64,
    pick: Arc<Pick<T>>,
}

struct Inner<T> {
    senders: VecDeque<SendOffer<T>>,
    receivers: VecDeque<RecvOffer<T>>,
}

/// A typed rendezvous point. A channel has no buffer and no value-dependent
/// matching: any send matches any receive on the same `Chan<T>`.
pub struct Chan<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Clone + Send + Sync + 'static> Chan<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                senders: VecDeque::new(),
                receivers: VecDeque::new(),
            }),
        })
    }

    /// An event that offers to deliver `v`. Produces `()` on commit.
    pub fn send_evt(self: &Arc<Self>, v: T) -> Event<()> {
        Event::Leaf(Arc::new(SendLeaf {
            chan: self.clone(),
            value: v,
        }))
    }

    /// An event that offers to receive. Produces the delivered value.
    pub fn recv_evt(self: &Arc<Self>) -> Event<T> {
        Event::Leaf(Arc::new(RecvLeaf { chan: self.clone() }))
    }

    /// Blocking send, as a thin wrapper over `sync`.
    pub fn send(self: &Arc<Self>, v: T) {
        crate::sync::sync(&self.send_evt(v))
    }

    /// Blocking receive, as a thin wrapper over `sync`.
    pub fn recv(self: &Arc<Self>) -> T {
        crate::sync::sync(&self.recv_evt())
    }

    /// One non-blocking round of the rendezvous protocol, without
    /// enqueueing on failure.
    pub fn send_poll(self: &Arc<Self>, v: T) -> bool {
        let pick: Arc<Pick<()>> = Arc::new(Pick::new());
        let mut guard = self.inner.lock();
        let matched = try_match_send(&mut guard.receivers, &pick, &v);
        drop(guard);
        matched
    }

    /// One non-blocking round of the rendezvous protocol, without
    /// enqueueing on failure.
    pub fn recv_poll(self: &Arc<Self>) -> Option<T> {
        let pick: Arc<Pick<T>> = Arc::new(Pick::new());
        let mut guard = self.inner.lock();
        if try_match_recv(&mut guard.senders, &pick) {
            drop(guard);
            Some(pick.value())
        } else {
            None
        }
    }

    /// Queue sizes, for tests and observability.
    pub fn stats(&self) -> ChannelStats {
        let guard = self.inner.lock();
        ChannelStats {
            senders_queued: guard.senders.len(),
            receivers_queued: guard.receivers.len(),
        }
    }

    fn register_send(self: &Arc<Self>, value: T, pick_s: &Arc<Pick<()>>) -> Canceller {
        let mut guard = self.inner.lock();
        let matched = try_match_send(&mut guard.receivers, pick_s, &value);
        let offer_id = if matched {
            None
        } else if pick_s.decided() {
            // Lost the race to a sibling branch between the scan above and
            // here; nothing to enqueue.
            None
        } else {
            let id = NEXT_OFFER_ID.fetch_add(1, Ordering::Relaxed);
            guard.senders.push_back(SendOffer {
                id,
                pick: pick_s.clone(),
                value,
            });
            Some(id)
        };
        drop(guard);

        match offer_id {
            None => Canceller::noop(),
            Some(id) => {
                let chan = self.clone();
                Canceller::new(move || {
                    let mut guard = chan.inner.lock();
                    if let Some(pos) = guard.senders.iter().position(|o| o.id == id) {
                        guard.senders.remove(pos);
                    }
                })
            }
        }
    }

    fn register_recv(self: &Arc<Self>, pick_r: &Arc<Pick<T>>) -> Canceller {
        let mut guard = self.inner.lock();
        let matched = try_match_recv(&mut guard.senders, pick_r);
        let offer_id = if matched || pick_r.decided() {
            None
        } else {
            let id = NEXT_OFFER_ID.fetch_add(1, Ordering::Relaxed);
            guard.receivers.push_back(RecvOffer {
                id,
                pick: pick_r.clone(),
            });
            Some(id)
        };
        drop(guard);

        match offer_id {
            None => Canceller::noop(),
            Some(id) => {
                let chan = self.clone();
                Canceller::new(move || {
                    let mut guard = chan.inner.lock();
                    if let Some(pos) = guard.receivers.iter().position(|o| o.id == id) {
                        guard.receivers.remove(pos);
                    }
                })
            }
        }
    }
}

/// Scans `receivers` front-to-back for one whose pick is still undecided,
/// reserves it, then reserves `pick_s`. Lazily drops already-decided
/// receivers encountered along the way. Returns whether a match committed.
fn try_match_send<T: Clone + Send + Sync + 'static>(
    receivers: &mut VecDeque<RecvOffer<T>>,
    pick_s: &Arc<Pick<()>>,
    value: &T,
) -> bool {
    let mut i = 0;
    while i < receivers.len() {
        if receivers[i].pick.decided() {
            receivers.remove(i);
            continue;
        }
        if !receivers[i].pick.try_reserve() {
            i += 1;
            continue;
        }
        // Reserved the receiver; now try the sender side.
        if pick_s.try_reserve() {
            let offer = receivers.remove(i).expect("index checked above");
            offer.pick.confirm_reserve(value.clone());
            pick_s.confirm_reserve(());
            trace!(pick_s = pick_s.id(), pick_r = offer.pick.id(), "rendezvous matched (send side)");
            return true;
        } else {
            // Our own commit is already spoken for by a sibling branch;
            // undo the receiver reservation and give up, we cannot win.
            receivers[i].pick.release_reserve();
            return false;
        }
    }
    false
}

/// Symmetric to `try_match_send`: scans `senders` for one to reserve, then
/// reserves `pick_r`.
fn try_match_recv<T: Clone + Send + Sync + 'static>(
    senders: &mut VecDeque<SendOffer<T>>,
    pick_r: &Arc<Pick<T>>,
) -> bool {
    let mut i = 0;
    while i < senders.len() {
        if senders[i].pick.decided() {
            senders.remove(i);
            continue;
        }
        if !senders[i].pick.try_reserve() {
            i += 1;
            continue;
        }
        if pick_r.try_reserve() {
            let offer = senders.remove(i).expect("index checked above");
            pick_r.confirm_reserve(offer.value.clone());
            offer.pick.confirm_reserve(());
            trace!(pick_r = pick_r.id(), pick_s = offer.pick.id(), "rendezvous matched (recv side)");
            return true;
        } else {
            senders[i].pick.release_reserve();
            return false;
        }
    }
    false
}

struct SendLeaf<T> {
    chan: Arc<Chan<T>>,
    value: T,
}

impl<T: Clone + Send + Sync + 'static> Leaf<()> for SendLeaf<T> {
    fn try_register(&self, pick: &Arc<Pick<()>>) -> Canceller {
        debug!(pick = pick.id(), "registering send offer");
        self.chan.register_send(self.value.clone(), pick)
    }
}

struct RecvLeaf<T> {
    chan: Arc<Chan<T>>,
}

impl<T: Clone + Send + Sync + 'static> Leaf<T> for RecvLeaf<T> {
    fn try_register(&self, pick: &Arc<Pick<T>>) -> Canceller {
        debug!(pick = pick.id(), "registering recv offer");
        self.chan.register_recv(pick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{always, choose, wrap};
    use crate::sync::{poll, sync};
    use std::thread;

    #[test]
    fn rendezvous_delivers_the_value() {
        let ch: Arc<Chan<i32>> = Chan::new();
        let ch2 = ch.clone();
        let sender = thread::spawn(move || ch2.send(42));
        let received = ch.recv();
        sender.join().unwrap();
        assert_eq!(received, 42);
        let stats = ch.stats();
        assert_eq!(stats.senders_queued, 0);
        assert_eq!(stats.receivers_queued, 0);
    }

    #[test]
    fn poll_without_a_counterpart_fails_without_enqueueing() {
        let ch: Arc<Chan<i32>> = Chan::new();
        assert_eq!(ch.recv_poll(), None);
        assert!(!ch.send_poll(1));
        let stats = ch.stats();
        assert_eq!(stats.senders_queued, 0);
        assert_eq!(stats.receivers_queued, 0);
    }

    #[test]
    fn fifo_within_one_sender() {
        let ch: Arc<Chan<i32>> = Chan::new();
        let ch2 = ch.clone();
        let sender = thread::spawn(move || {
            ch2.send(1);
            ch2.send(2);
        });
        let first = ch.recv();
        let second = ch.recv();
        sender.join().unwrap();
        assert_eq!((first, second), (1, 2));
    }

    #[test]
    fn choose_with_timeout_over_empty_channel_times_out() {
        let ch: Arc<Chan<i32>> = Chan::new();
        let e = choose(vec![
            wrap(ch.recv_evt(), |v| format!("got {v}")),
            wrap(crate::wheel::timeout(std::time::Duration::from_millis(30)), |_| {
                "timeout".to_string()
            }),
        ]);
        assert_eq!(sync(&e), "timeout");
        assert_eq!(ch.stats().receivers_queued, 0);
    }

    #[test]
    fn many_to_many_rendezvous() {
        let ch: Arc<Chan<i32>> = Chan::new();
        let senders: Vec<_> = (0..100)
            .map(|i| {
                let c = ch.clone();
                thread::spawn(move || c.send(i))
            })
            .collect();
        let receivers: Vec<_> = (0..100)
            .map(|_| {
                let c = ch.clone();
                thread::spawn(move || c.recv())
            })
            .collect();
        for s in senders {
            s.join().unwrap();
        }
        let mut values: Vec<i32> = receivers.into_iter().map(|r| r.join().unwrap()).collect();
        values.sort_unstable();
        assert_eq!(values, (0..100).collect::<Vec<_>>());
        let stats = ch.stats();
        assert_eq!(stats.senders_queued, 0);
        assert_eq!(stats.receivers_queued, 0);
    }

    #[test]
    fn poll_on_always_ready_channel_send() {
        let ch: Arc<Chan<i32>> = Chan::new();
        let ch2 = ch.clone();
        let receiver = thread::spawn(move || ch2.recv());
        // Give the receiver a moment to register before polling the send.
        thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(poll(&ch.send_evt(5)), Some(()));
        assert_eq!(receiver.join().unwrap(), 5);
    }

    #[test]
    fn always_wins_over_recv() {
        let ch: Arc<Chan<i32>> = Chan::new();
        let e = choose(vec![ch.recv_evt(), always(1)]);
        assert_eq!(sync(&e), 1);
        assert_eq!(ch.stats().receivers_queued, 0);
    }
}
