//! End-to-end scenarios exercising the event algebra, channel rendezvous,
//! and timing wheel together.

mod common;

use cml::{always, choose, sync, with_nack, wrap, Chan};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn rendezvous_delivers_and_drains_queues() {
    common::init_tracing();
    let ch: Arc<Chan<i32>> = Chan::new();
    let ch2 = ch.clone();
    let sender = thread::spawn(move || sync(&ch2.send_evt(42)));
    let received = sync(&ch.recv_evt());
    sender.join().unwrap();

    assert_eq!(received, 42);
    let stats = ch.stats();
    assert_eq!(stats.senders_queued, 0);
    assert_eq!(stats.receivers_queued, 0);
}

#[test]
fn choose_races_a_silent_channel_against_a_timeout() {
    common::init_tracing();
    let ch: Arc<Chan<i32>> = Chan::new();
    let e = choose(vec![
        wrap(ch.recv_evt(), |v| format!("got {v}")),
        wrap(cml::timeout(Duration::from_millis(50)), |_| "timeout".to_string()),
    ]);

    let start = Instant::now();
    assert_eq!(sync(&e), "timeout");
    assert!(start.elapsed() >= Duration::from_millis(45));
    assert_eq!(ch.stats().receivers_queued, 0);
}

#[test]
fn nack_fires_cleanup_for_the_losing_branch() {
    common::init_tracing();
    let ch: Arc<Chan<i32>> = Chan::new();
    let cleanup_flag = Arc::new(AtomicBool::new(false));
    let flag_for_body = cleanup_flag.clone();
    let ch_for_body = ch.clone();

    let e = choose(vec![
        with_nack(move |nack| {
            let flag = flag_for_body.clone();
            let recv = ch_for_body.recv_evt();
            thread::spawn(move || {
                sync(&nack);
                flag.store(true, Ordering::SeqCst);
            });
            recv
        }),
        always(0),
    ]);

    assert_eq!(sync(&e), 0);

    let deadline = Instant::now() + Duration::from_millis(500);
    while !cleanup_flag.load(Ordering::SeqCst) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(cleanup_flag.load(Ordering::SeqCst));
    assert_eq!(ch.stats().receivers_queued, 0);
}

#[test]
fn immediate_ready_tie_picks_exactly_one() {
    common::init_tracing();
    for _ in 0..200 {
        let winner = sync(&choose(vec![always(1), always(2)]));
        assert!(winner == 1 || winner == 2);
    }
}

#[test]
fn timer_cancellation_at_scale() {
    common::init_tracing();
    use cml::config::WheelConfig;
    use cml::wheel::TimingWheel;

    let config = WheelConfig {
        tick: Duration::from_millis(1),
        ..WheelConfig::default()
    };
    let wheel = TimingWheel::new_paused(config).unwrap();
    let fired = Arc::new(AtomicUsize::new(0));
    let mut ids = Vec::with_capacity(1000);
    for ms in 1..=1000u64 {
        let counter = fired.clone();
        let id = wheel
            .schedule(Duration::from_millis(ms), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        ids.push(id);
    }
    for id in &ids[499..600] {
        assert!(wheel.cancel(*id));
    }
    wheel.advance_to(1200);
    assert_eq!(fired.load(Ordering::SeqCst), 899);
}

#[test]
fn parallel_many_to_many_rendezvous_has_no_loss_or_duplication() {
    common::init_tracing();
    let ch: Arc<Chan<i32>> = Chan::new();
    let senders: Vec<_> = (0..100)
        .map(|i| {
            let c = ch.clone();
            thread::spawn(move || sync(&c.send_evt(i)))
        })
        .collect();
    let receivers: Vec<_> = (0..100)
        .map(|_| {
            let c = ch.clone();
            thread::spawn(move || sync(&c.recv_evt()))
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
