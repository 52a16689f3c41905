//! Hierarchical timing wheel: schedules callbacks relative to a tick
//! counter advanced by a dedicated background thread, with O(1) cancellation
//! via a shared flag rather than a search through bucket contents.

mod level;

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::config::{CallbackMode, WheelConfig};
use crate::error::{CmlError, CmlResult};
use crate::event::{Canceller, Event, Leaf};
use crate::pick::Pick;
use crate::stats::WheelStats;
use level::LevelMeta;

/// Opaque handle to a scheduled timer, returned by `schedule` and
/// `schedule_interval` and accepted by `cancel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

type Callback = Arc<dyn Fn() + Send + Sync>;

struct Entry {
    id: TimerId,
    deadline_tick: u64,
    interval_ticks: Option<u64>,
    cancelled: Arc<AtomicBool>,
    callback: Callback,
}

struct WheelState {
    current_tick: u64,
    levels: Vec<Vec<VecDeque<Entry>>>,
    overflow: Vec<Entry>,
}

/// A hierarchical timing wheel. Cheap to construct; construction spawns a
/// background thread that advances the wheel on a fixed cadence until
/// `stop` is called or the wheel is dropped.
pub struct TimingWheel {
    config: WheelConfig,
    metas: Vec<LevelMeta>,
    state: Mutex<WheelState>,
    cancel_flags: DashMap<TimerId, Arc<AtomicBool>>,
    next_id: AtomicU64,
    armed: AtomicUsize,
    fired_total: AtomicU64,
    cancelled_total: AtomicU64,
    ticks_total: AtomicU64,
    callback_panics_total: AtomicU64,
    stop_flag: Arc<AtomicBool>,
    advancer: Mutex<Option<JoinHandle<()>>>,
}

impl TimingWheel {
    /// Build and start a wheel from `config`. Returns an error only if
    /// `config` itself is invalid (zero levels, a non-power-of-two slot
    /// count, or a zero tick).
    pub fn new(config: WheelConfig) -> CmlResult<Arc<Self>> {
        let wheel = Self::new_paused(config)?;
        wheel.clone().spawn_advancer();
        Ok(wheel)
    }

    /// Build a wheel with no background advancer. `advance_to` must be
    /// called explicitly to make any progress; useful for deterministic
    /// tests that would otherwise race a wall-clock thread.
    pub fn new_paused(config: WheelConfig) -> CmlResult<Arc<Self>> {
        config.validate()?;
        let metas = level::derive(&config.levels);
        let levels = metas
            .iter()
            .map(|m| (0..m.slots).map(|_| VecDeque::new()).collect())
            .collect();

        Ok(Arc::new(TimingWheel {
            config,
            metas,
            state: Mutex::new(WheelState {
                current_tick: 0,
                levels,
                overflow: Vec::new(),
            }),
            cancel_flags: DashMap::new(),
            next_id: AtomicU64::new(1),
            armed: AtomicUsize::new(0),
            fired_total: AtomicU64::new(0),
            cancelled_total: AtomicU64::new(0),
            ticks_total: AtomicU64::new(0),
            callback_panics_total: AtomicU64::new(0),
            stop_flag: Arc::new(AtomicBool::new(false)),
            advancer: Mutex::new(None),
        }))
    }

    fn spawn_advancer(self: Arc<Self>) {
        let tick = self.config.tick;
        let stop_flag = self.stop_flag.clone();
        let wheel = self.clone();
        let handle = std::thread::Builder::new()
            .name("cml-timer-wheel".to_string())
            .spawn(move || {
                let start = Instant::now();
                let mut next_tick = 1u64;
                while !stop_flag.load(Ordering::Relaxed) {
                    let target_at = start + tick * next_tick as u32;
                    let now = Instant::now();
                    if target_at > now {
                        std::thread::sleep(target_at - now);
                    }
                    wheel.advance_to(next_tick);
                    next_tick += 1;
                }
            })
            .expect("failed to spawn timer wheel advancer thread");
        *self.advancer.lock() = Some(handle);
    }

    /// Stop the background advancer. Already-armed timers remain armed but
    /// will not fire until `advance_to` is called manually (useful in
    /// tests that want deterministic control over wheel time).
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.advancer.lock().take() {
            let _ = handle.join();
        }
    }

    /// Schedule a one-shot callback to fire after `delay`.
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> CmlResult<TimerId>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.schedule_inner(delay, None, Arc::new(callback))
    }

    /// Schedule a callback that re-arms itself every `interval` after first
    /// firing at `delay`.
    pub fn schedule_interval<F>(
        &self,
        delay: Duration,
        interval: Duration,
        callback: F,
    ) -> CmlResult<TimerId>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let interval_ticks = self.ticks_for(interval)?;
        if interval_ticks == 0 {
            return Err(CmlError::InvalidDuration { duration: interval });
        }
        self.schedule_inner(delay, Some(interval_ticks), Arc::new(callback))
    }

    fn schedule_inner(
        &self,
        delay: Duration,
        interval_ticks: Option<u64>,
        callback: Callback,
    ) -> CmlResult<TimerId> {
        let delay_ticks = self.ticks_for(delay)?;
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancelled = Arc::new(AtomicBool::new(false));
        self.cancel_flags.insert(id, cancelled.clone());

        let mut guard = self.state.lock();
        let deadline_tick = guard.current_tick + delay_ticks.max(1);
        let entry = Entry {
            id,
            deadline_tick,
            interval_ticks,
            cancelled,
            callback,
        };
        self.insert_entry(&mut guard, entry);
        self.armed.fetch_add(1, Ordering::Relaxed);
        trace!(timer = id.0, deadline_tick, "timer scheduled");
        Ok(id)
    }

    /// Duration to tick count, rounding a positive sub-tick duration up to
    /// one tick rather than truncating it to zero. Only an exactly-zero
    /// duration is reported as zero ticks; the caller decides whether that's
    /// an error (`schedule_interval`) or rounds up too (`schedule_inner`).
    fn ticks_for(&self, d: Duration) -> CmlResult<u64> {
        if d.is_zero() {
            return Ok(0);
        }
        let ticks = d.as_nanos() / self.config.tick.as_nanos().max(1);
        Ok((ticks as u64).max(1))
    }

    /// O(1): wins the entry's fate against a concurrent `fire` with a single
    /// compare-and-swap on the entry's own flag, so a cancel racing a fire in
    /// `advance_to` can never both report success and let the callback run.
    /// The entry itself is skipped wherever it is later found (bucket fire,
    /// cascade, overflow sweep) rather than removed eagerly.
    pub fn cancel(&self, id: TimerId) -> bool {
        if let Some((_, flag)) = self.cancel_flags.remove(&id) {
            if flag
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                self.cancelled_total.fetch_add(1, Ordering::Relaxed);
                self.armed.fetch_sub(1, Ordering::Relaxed);
                return true;
            }
        }
        false
    }

    pub fn stats(&self) -> WheelStats {
        WheelStats {
            armed: self.armed.load(Ordering::Relaxed),
            fired_total: self.fired_total.load(Ordering::Relaxed),
            cancelled_total: self.cancelled_total.load(Ordering::Relaxed),
            ticks_total: self.ticks_total.load(Ordering::Relaxed),
            callback_panics_total: self.callback_panics_total.load(Ordering::Relaxed),
        }
    }

    fn place(&self, now: u64, entry: Entry) -> Placement {
        let delta = entry.deadline_tick.saturating_sub(now);
        for (i, m) in self.metas.iter().enumerate() {
            if delta < m.span() {
                let idx = m.index_of(entry.deadline_tick);
                return Placement::Level(i, idx, entry);
            }
        }
        Placement::Overflow(entry)
    }

    fn insert_entry(&self, guard: &mut WheelState, entry: Entry) {
        match self.place(guard.current_tick, entry) {
            Placement::Level(level, idx, entry) => guard.levels[level][idx].push_back(entry),
            Placement::Overflow(entry) => guard.overflow.push(entry),
        }
    }

    /// Advance the wheel's notion of time up to (and including) `target_tick`,
    /// firing every due, non-cancelled entry along the way. Exposed so tests
    /// can drive the wheel deterministically without sleeping.
    pub fn advance_to(&self, target_tick: u64) {
        let due = {
            let mut guard = self.state.lock();
            let mut due = Vec::new();
            while guard.current_tick < target_tick {
                guard.current_tick += 1;
                let tick = guard.current_tick;
                self.cascade(&mut guard, tick);
                let m0 = &self.metas[0];
                let idx0 = m0.index_of(tick);
                due.extend(std::mem::take(&mut guard.levels[0][idx0]));
                self.ticks_total.fetch_add(1, Ordering::Relaxed);
            }
            due
        };
        for entry in due {
            self.fire(entry);
        }
    }

    fn cascade(&self, guard: &mut WheelState, tick: u64) {
        for i in 1..self.metas.len() {
            let period = self.metas[i].period();
            if tick % period != 0 {
                continue;
            }
            let idx = self.metas[i].index_of(tick);
            let bucket = std::mem::take(&mut guard.levels[i][idx]);
            debug!(level = i, slot = idx, count = bucket.len(), "cascading");
            for entry in bucket {
                self.insert_entry(guard, entry);
            }
        }
        let top = self.metas.len() - 1;
        if tick % self.metas[top].span() == 0 && !guard.overflow.is_empty() {
            let pending = std::mem::take(&mut guard.overflow);
            for entry in pending {
                self.insert_entry(guard, entry);
            }
        }
    }

    fn fire(&self, entry: Entry) {
        // Races `cancel` for this entry: whichever side wins the flip from
        // false to true owns the entry's fate. A losing `cancel` has nothing
        // left to do; a losing `fire` must not touch stats or run the
        // callback.
        if entry
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.cancel_flags.remove(&entry.id);
        self.armed.fetch_sub(1, Ordering::Relaxed);
        self.fired_total.fetch_add(1, Ordering::Relaxed);
        trace!(timer = entry.id.0, "timer firing");

        if let Some(interval_ticks) = entry.interval_ticks {
            // A fresh flag for the next firing: the one just consumed above
            // is permanently spent and must never be reused, or the
            // re-armed entry would be born pre-cancelled.
            let cancelled = Arc::new(AtomicBool::new(false));
            self.cancel_flags.insert(entry.id, cancelled.clone());
            let mut guard = self.state.lock();
            let deadline_tick = guard.current_tick + interval_ticks;
            self.armed.fetch_add(1, Ordering::Relaxed);
            self.insert_entry(
                &mut guard,
                Entry {
                    id: entry.id,
                    deadline_tick,
                    interval_ticks: Some(interval_ticks),
                    cancelled,
                    callback: entry.callback.clone(),
                },
            );
            drop(guard);
        }

        self.run_callback(entry.callback);
    }

    fn run_callback(&self, callback: Callback) {
        match self.config.callback_mode {
            CallbackMode::Inline => self.run_callback_caught(&callback),
            CallbackMode::Spawned => {
                // Detached: a slow or blocking callback must not delay the
                // next tick. Panics are logged but not folded into
                // `callback_panics_total`, which only counts inline panics
                // the advancer itself observed.
                std::thread::spawn(move || {
                    if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                        error!("timer callback panicked on a spawned thread");
                    }
                });
            }
        }
    }

    fn run_callback_caught(&self, callback: &Callback) {
        let callback = callback.clone();
        if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
            self.callback_panics_total.fetch_add(1, Ordering::Relaxed);
            warn!("timer callback panicked; isolated, wheel continues");
        }
    }
}

impl Drop for TimingWheel {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.advancer.lock().take() {
            let _ = handle.join();
        }
    }
}

enum Placement {
    Level(usize, usize, Entry),
    Overflow(Entry),
}

struct TimeoutLeaf {
    wheel: Arc<TimingWheel>,
    delay: Duration,
}

impl Leaf<()> for TimeoutLeaf {
    fn try_register(&self, pick: &Arc<Pick<()>>) -> Canceller {
        let forward = pick.clone();
        let wheel = self.wheel.clone();
        let id = self
            .wheel
            .schedule(self.delay, move || {
                forward.try_decide(());
            })
            .expect("validated duration cannot fail to schedule");
        Canceller::new(move || {
            wheel.cancel(id);
        })
    }
}

/// An event that becomes ready after `delay`, firing on the process-wide
/// default wheel (lazily started on first use, never stopped). Prefer
/// `Chan::send_evt`/`recv_evt` composed with `choose` over calling this in a
/// hot loop with very short delays; each call arms one timer entry.
pub fn timeout(delay: Duration) -> Event<()> {
    Event::Leaf(Arc::new(TimeoutLeaf {
        wheel: default_wheel(),
        delay,
    }))
}

fn default_wheel() -> Arc<TimingWheel> {
    static DEFAULT: OnceLock<Arc<TimingWheel>> = OnceLock::new();
    DEFAULT
        .get_or_init(|| {
            TimingWheel::new(WheelConfig::default())
                .expect("default wheel configuration is always valid")
        })
        .clone()
}
