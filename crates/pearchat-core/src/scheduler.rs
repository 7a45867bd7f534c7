//! Periodic task and store-watch scheduling
//!
//! The presence loop never sleeps or spawns on its own. It hands its
//! callbacks to a [`Scheduler`]:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  TokioScheduler                                                 │
//! │  ├── every(): tokio interval task, aborted on cancel            │
//! │  └── watch(): task awaiting the store's change channel          │
//! │                                                                 │
//! │  ManualScheduler                                                │
//! │  ├── every(): entry in a min-heap keyed by (due, registration)  │
//! │  ├── watch(): receiver drained synchronously by advance()       │
//! │  └── advance(d): moves a ManualClock and runs what became due   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::clock::{Clock, ManualClock};
use crate::storage::StoreChange;
use crate::types::Timestamp;

/// Callback run on every period.
pub type Tick = Box<dyn FnMut() + Send>;

/// Callback run for every store change notification.
pub type OnChange = Box<dyn FnMut(StoreChange) + Send>;

/// Upper bound on watcher rounds within one drain.
const MAX_DRAIN_ROUNDS: usize = 64;

/// Runs periodic callbacks and store-change watchers.
pub trait Scheduler: Send + Sync {
    /// Run `task` every `period`, first after one full period.
    fn every(&self, period: Duration, task: Tick) -> TaskHandle;

    /// Run `on_change` for every notification received on `changes`.
    fn watch(&self, changes: broadcast::Receiver<StoreChange>, on_change: OnChange) -> TaskHandle;
}

/// Handle to a scheduled task. The task stops on [`cancel`](Self::cancel) or drop.
#[derive(Debug)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

impl TaskHandle {
    fn new(cancelled: Arc<AtomicBool>, abort: Option<AbortHandle>) -> Self {
        Self { cancelled, abort }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::SeqCst);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::SeqCst)
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tokio
// ═══════════════════════════════════════════════════════════════════════════

/// Scheduler backed by tokio tasks.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler on the runtime of the calling task, if there is one.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn every(&self, period: Duration, mut task: Tick) -> TaskHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        let join = self.handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if flag.load(AtomicOrdering::SeqCst) {
                    break;
                }
                task();
            }
        });

        TaskHandle::new(cancelled, Some(join.abort_handle()))
    }

    fn watch(
        &self,
        mut changes: broadcast::Receiver<StoreChange>,
        mut on_change: OnChange,
    ) -> TaskHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        let join = self.handle.spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        if flag.load(AtomicOrdering::SeqCst) {
                            break;
                        }
                        on_change(change);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Store watcher lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        TaskHandle::new(cancelled, Some(join.abort_handle()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Manual (virtual time)
// ═══════════════════════════════════════════════════════════════════════════

struct Timer {
    run_at: Timestamp,
    id: u64,
    period_ms: i64,
    task: Tick,
    cancelled: Arc<AtomicBool>,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.run_at == other.run_at && self.id == other.id
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap: earliest first, then registration order
        (other.run_at, other.id).cmp(&(self.run_at, self.id))
    }
}

struct Watcher {
    changes: broadcast::Receiver<StoreChange>,
    on_change: OnChange,
    cancelled: Arc<AtomicBool>,
}

#[derive(Default)]
struct ManualState {
    timers: BinaryHeap<Timer>,
    watchers: Vec<Watcher>,
    next_id: u64,
}

/// Deterministic scheduler on a [`ManualClock`].
///
/// Nothing runs until [`advance`](Self::advance) is called. Clones share the
/// same queue and clock.
#[derive(Clone)]
pub struct ManualScheduler {
    clock: ManualClock,
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            state: Arc::new(Mutex::new(ManualState::default())),
        }
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Number of periodic tasks and watchers not yet cancelled.
    pub fn active_tasks(&self) -> usize {
        let state = self.state.lock();
        let timers = state
            .timers
            .iter()
            .filter(|t| !t.cancelled.load(AtomicOrdering::SeqCst))
            .count();
        let watchers = state
            .watchers
            .iter()
            .filter(|w| !w.cancelled.load(AtomicOrdering::SeqCst))
            .count();
        timers + watchers
    }

    /// Move virtual time forward by `by`, running every task that falls due.
    ///
    /// Tasks run in (due time, registration order). The clock reads each
    /// task's due time while it runs and ends at `now + by`. Pending store
    /// notifications are delivered before each timer and once more at the end.
    pub fn advance(&self, by: Duration) {
        let target = self.clock.now_ms() + by.as_millis() as i64;
        self.drain_watchers();

        loop {
            let next = {
                let mut state = self.state.lock();
                match state.timers.peek() {
                    Some(timer) if timer.run_at <= target => state.timers.pop(),
                    _ => None,
                }
            };
            let Some(mut timer) = next else {
                break;
            };
            if timer.cancelled.load(AtomicOrdering::SeqCst) {
                continue;
            }

            self.clock.set(timer.run_at.max(self.clock.now_ms()));
            (timer.task)();
            self.drain_watchers();

            if !timer.cancelled.load(AtomicOrdering::SeqCst) {
                timer.run_at += timer.period_ms;
                self.state.lock().timers.push(timer);
            }
        }

        self.clock.set(target.max(self.clock.now_ms()));
        self.drain_watchers();
    }

    /// Deliver queued store notifications until a round delivers nothing.
    ///
    /// Callbacks run with the queue unlocked, so they may register or cancel
    /// tasks.
    pub fn drain_watchers(&self) {
        let mut watchers = std::mem::take(&mut self.state.lock().watchers);

        for _ in 0..MAX_DRAIN_ROUNDS {
            let mut delivered = false;
            for watcher in watchers.iter_mut() {
                loop {
                    if watcher.cancelled.load(AtomicOrdering::SeqCst) {
                        break;
                    }
                    match watcher.changes.try_recv() {
                        Ok(change) => {
                            delivered = true;
                            (watcher.on_change)(change);
                        }
                        Err(TryRecvError::Lagged(skipped)) => {
                            debug!(skipped, "Store watcher lagged");
                        }
                        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                    }
                }
            }
            if !delivered {
                break;
            }
        }

        watchers.retain(|w| !w.cancelled.load(AtomicOrdering::SeqCst));
        let mut state = self.state.lock();
        // Keep watchers registered by callbacks during the drain
        watchers.append(&mut state.watchers);
        state.watchers = watchers;
    }
}

impl Scheduler for ManualScheduler {
    fn every(&self, period: Duration, task: Tick) -> TaskHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let period_ms = (period.as_millis() as i64).max(1);

        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.timers.push(Timer {
            run_at: self.clock.now_ms() + period_ms,
            id,
            period_ms,
            task,
            cancelled: cancelled.clone(),
        });

        TaskHandle::new(cancelled, None)
    }

    fn watch(&self, changes: broadcast::Receiver<StoreChange>, on_change: OnChange) -> TaskHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.state.lock().watchers.push(Watcher {
            changes,
            on_change,
            cancelled: cancelled.clone(),
        });
        TaskHandle::new(cancelled, None)
    }
}
