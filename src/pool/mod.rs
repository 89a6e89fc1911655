//! Autoscaled bounded-concurrency worker pool
//!
//! The pool runs submitted futures on the tokio runtime while keeping the
//! number of simultaneously running tasks at or below a desired concurrency.
//! The ceiling is an atomic counter paired with a [`Notify`] rather than a
//! semaphore, so it can shrink without revoking permits: a lowered ceiling
//! simply stops new acquisitions until enough running tasks finish.
//!
//! A background ticker samples system load through a [`SystemProbe`] and
//! adjusts the ceiling between `min_concurrency` and `max_concurrency`. The
//! scaling decision itself is the pure function [`plan_scaling`].
//!
//! Submitted tasks return `Result`; an error is logged and contained, it
//! never crashes the pool or sibling tasks.

pub mod probe;

pub use probe::{FixedProbe, SystemLoad, SystemProbe, SysinfoProbe};

use crate::DriftnetError;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

type TaskFuture = Pin<Box<dyn Future<Output = crate::Result<()>> + Send>>;

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Floor of the concurrency ceiling
    pub min_concurrency: usize,

    /// Hard limit of the concurrency ceiling
    pub max_concurrency: usize,

    /// Ceiling at startup
    pub initial_concurrency: usize,

    /// Fraction of the current ceiling added per scale-up step
    pub scale_up_ratio: f64,

    /// Fraction of the current ceiling removed per scale-down step
    pub scale_down_ratio: f64,

    /// CPU ratio above which the pool refuses to grow
    pub max_cpu_ratio: f64,

    /// Memory ratio above which the pool refuses to grow
    pub max_memory_ratio: f64,

    /// Interval of the autoscale ticker
    pub autoscale_interval: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            min_concurrency: 1,
            max_concurrency: 32,
            initial_concurrency: 2,
            scale_up_ratio: 0.5,
            scale_down_ratio: 0.5,
            max_cpu_ratio: 0.95,
            max_memory_ratio: 0.9,
            autoscale_interval: Duration::from_secs(10),
        }
    }
}

/// Computes the next concurrency ceiling, if it should change
///
/// Grows when there is backlog, the system has headroom and the ceiling is
/// below its limit. Shrinks when there is no backlog, utilization of the
/// ceiling has dropped below 30% and the ceiling is above its floor. Step
/// size is proportional to the current ceiling, at least 1.
pub fn plan_scaling(
    current: usize,
    running: usize,
    backlog: usize,
    load: SystemLoad,
    options: &PoolOptions,
) -> Option<usize> {
    if backlog > 0
        && load.cpu_ratio < options.max_cpu_ratio
        && load.memory_ratio < options.max_memory_ratio
        && current < options.max_concurrency
    {
        let step = ((current as f64 * options.scale_up_ratio).round() as usize).max(1);
        return Some((current + step).min(options.max_concurrency));
    }

    if backlog == 0 && (running as f64) < current as f64 * 0.3 && current > options.min_concurrency
    {
        let step = ((current as f64 * options.scale_down_ratio).round() as usize).max(1);
        return Some(current.saturating_sub(step).max(options.min_concurrency));
    }

    None
}

/// Bounded-concurrency task pool with load-based autoscaling
pub struct AutoscaledPool {
    options: PoolOptions,
    probe: Arc<dyn SystemProbe>,

    /// Current concurrency ceiling
    desired: AtomicUsize,

    /// Tasks currently executing
    running: AtomicUsize,

    /// Tasks accepted but not yet dispatched
    queued: AtomicUsize,

    stopped: AtomicBool,

    /// Signalled when a slot frees up or the ceiling grows
    slot_freed: Notify,

    /// Signalled once by `stop` to halt the dispatcher and the ticker
    shutdown: Notify,

    sender: mpsc::UnboundedSender<TaskFuture>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<TaskFuture>>>,
}

impl AutoscaledPool {
    /// Creates a pool; no tasks run until [`start`](Self::start) is called
    pub fn new(options: PoolOptions, probe: Arc<dyn SystemProbe>) -> Self {
        let initial = options
            .initial_concurrency
            .clamp(options.min_concurrency, options.max_concurrency);
        let (sender, receiver) = mpsc::unbounded_channel();

        Self {
            options,
            probe,
            desired: AtomicUsize::new(initial),
            running: AtomicUsize::new(0),
            queued: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            slot_freed: Notify::new(),
            shutdown: Notify::new(),
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Spawns the dispatcher and the autoscale ticker
    ///
    /// `backlog` reports outstanding work beyond the pool's own queue; the
    /// ticker adds the two when deciding whether there is demand. Calling
    /// `start` twice is a no-op.
    pub fn start<F>(self: &Arc<Self>, backlog: F)
    where
        F: Fn() -> usize + Send + Sync + 'static,
    {
        let receiver = self.receiver.lock().unwrap().take();
        let Some(receiver) = receiver else {
            return;
        };

        let pool = Arc::clone(self);
        tokio::spawn(pool.dispatch_loop(receiver));

        let pool = Arc::clone(self);
        tokio::spawn(pool.autoscale_loop(backlog));
    }

    /// Accepts a task for execution
    ///
    /// The task is queued until the dispatcher can acquire a slot for it.
    /// Fails once the pool has been stopped.
    pub fn submit<F>(&self, task: F) -> crate::Result<()>
    where
        F: Future<Output = crate::Result<()>> + Send + 'static,
    {
        if self.stopped.load(Ordering::Acquire) {
            return Err(DriftnetError::PoolStopped);
        }
        self.queued.fetch_add(1, Ordering::AcqRel);
        self.sender.send(Box::pin(task)).map_err(|_| {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            DriftnetError::PoolStopped
        })
    }

    /// Stops accepting tasks and halts the dispatcher and the ticker
    ///
    /// Tasks already running are left to finish.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.shutdown.notify_waiters();
        self.slot_freed.notify_waiters();
        tracing::debug!("Worker pool stopped");
    }

    /// Current concurrency ceiling
    pub fn desired_concurrency(&self) -> usize {
        self.desired.load(Ordering::Acquire)
    }

    /// Number of tasks currently executing
    pub fn running(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    /// Number of accepted tasks awaiting dispatch
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// True when no task is running and none is queued
    pub fn is_idle(&self) -> bool {
        self.running() == 0 && self.queued() == 0
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Samples the probe and applies one scaling decision
    ///
    /// Normally driven by the ticker; exposed so callers and tests can force
    /// a decision at a known moment.
    pub fn maybe_scale(&self, backlog: usize) {
        let load = self.probe.sample();
        let current = self.desired.load(Ordering::Acquire);
        let running = self.running.load(Ordering::Acquire);

        if let Some(target) = plan_scaling(current, running, backlog, load, &self.options) {
            self.desired.store(target, Ordering::Release);
            if target > current {
                tracing::debug!(
                    "Scaling up {} -> {} (backlog {}, cpu {:.2}, mem {:.2})",
                    current,
                    target,
                    backlog,
                    load.cpu_ratio,
                    load.memory_ratio
                );
                // Grown capacity is acquirable immediately
                self.slot_freed.notify_waiters();
            } else {
                tracing::debug!(
                    "Scaling down {} -> {} (running {})",
                    current,
                    target,
                    running
                );
            }
        }
    }

    async fn dispatch_loop(self: Arc<Self>, mut receiver: mpsc::UnboundedReceiver<TaskFuture>) {
        // Created before the loop so a stop between polls is not lost
        let shutdown = self.shutdown.notified();
        tokio::pin!(shutdown);
        loop {
            let task = tokio::select! {
                _ = &mut shutdown => break,
                task = receiver.recv() => match task {
                    Some(task) => task,
                    None => break,
                },
            };
            // The task counts as queued until its slot is held, so is_idle
            // never reads true while a task awaits dispatch
            let acquired = self.acquire_slot().await;
            self.queued.fetch_sub(1, Ordering::AcqRel);
            if !acquired {
                break;
            }

            let guard = SlotGuard {
                pool: Arc::clone(&self),
            };
            tokio::spawn(async move {
                let _guard = guard;
                if let Err(e) = task.await {
                    tracing::warn!("Pool task failed: {}", e);
                }
            });
        }
        tracing::debug!("Dispatcher exited");
    }

    /// Waits for a free slot under the current ceiling
    ///
    /// Only the dispatcher acquires, so the check-then-increment is not
    /// racing other acquirers. Returns false once the pool is stopped.
    async fn acquire_slot(&self) -> bool {
        loop {
            let notified = self.slot_freed.notified();
            if self.stopped.load(Ordering::Acquire) {
                return false;
            }
            if self.running.load(Ordering::Acquire) < self.desired.load(Ordering::Acquire) {
                self.running.fetch_add(1, Ordering::AcqRel);
                return true;
            }
            notified.await;
        }
    }

    async fn autoscale_loop<F>(self: Arc<Self>, backlog: F)
    where
        F: Fn() -> usize + Send + Sync + 'static,
    {
        let mut ticker = tokio::time::interval(self.options.autoscale_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;
        let shutdown = self.shutdown.notified();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }
            if self.stopped.load(Ordering::Acquire) {
                break;
            }
            let demand = self.queued.load(Ordering::Acquire) + backlog();
            self.maybe_scale(demand);
        }
    }
}

/// Releases a concurrency slot exactly once, on every exit path
struct SlotGuard {
    pool: Arc<AutoscaledPool>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.pool.running.fetch_sub(1, Ordering::AcqRel);
        self.pool.slot_freed.notify_one();
    }
}
