//! Crawl statistics aggregation
//!
//! A single [`StatsAggregator`] instance is shared by reference into every
//! task closure; counters are atomic and the duration extremes sit behind a
//! small mutex, so recording is safe from any task. There is no ambient or
//! global state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Default, Clone, Copy)]
struct DurationStats {
    total_ms: u64,
    min_ms: u64,
    max_ms: u64,
}

/// Thread-safe counters and duration extremes for a crawl run
#[derive(Debug)]
pub struct StatsAggregator {
    start_time: Instant,
    items_finished: AtomicU64,
    items_failed: AtomicU64,
    items_skipped: AtomicU64,
    retries_scheduling: AtomicU64,
    retries_transport: AtomicU64,
    durations: Mutex<DurationStats>,
}

impl StatsAggregator {
    /// Creates a new aggregator with all counters at zero
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            items_finished: AtomicU64::new(0),
            items_failed: AtomicU64::new(0),
            items_skipped: AtomicU64::new(0),
            retries_scheduling: AtomicU64::new(0),
            retries_transport: AtomicU64::new(0),
            durations: Mutex::new(DurationStats::default()),
        }
    }

    /// Records a successfully handled item and its end-to-end duration
    pub fn record_finished(&self, duration: Duration) {
        self.items_finished.fetch_add(1, Ordering::Relaxed);

        let ms = duration.as_millis() as u64;
        let mut d = self.durations.lock().unwrap();
        d.total_ms += ms;
        if d.min_ms == 0 || ms < d.min_ms {
            d.min_ms = ms;
        }
        if ms > d.max_ms {
            d.max_ms = ms;
        }
    }

    /// Records a permanently failed item
    pub fn record_failed(&self) {
        self.items_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an item skipped by the blocked-URL predicate
    pub fn record_skipped(&self) {
        self.items_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a scheduling-level retry (item reclaimed to the frontier)
    pub fn record_scheduling_retry(&self) {
        self.retries_scheduling.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a transport-level retry of a single execution attempt
    pub fn record_transport_retry(&self) {
        self.retries_transport.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of successfully handled items so far
    pub fn finished(&self) -> u64 {
        self.items_finished.load(Ordering::Relaxed)
    }

    /// Number of permanently failed items so far
    pub fn failed(&self) -> u64 {
        self.items_failed.load(Ordering::Relaxed)
    }

    /// Captures a consistent snapshot for reporting
    pub fn snapshot(&self) -> StatsSnapshot {
        let d = *self.durations.lock().unwrap();
        let finished = self.items_finished.load(Ordering::Relaxed);
        let runtime = self.start_time.elapsed();

        StatsSnapshot {
            items_finished: finished,
            items_failed: self.items_failed.load(Ordering::Relaxed),
            items_skipped: self.items_skipped.load(Ordering::Relaxed),
            retries_scheduling: self.retries_scheduling.load(Ordering::Relaxed),
            retries_transport: self.retries_transport.load(Ordering::Relaxed),
            avg_duration_ms: if finished > 0 {
                d.total_ms as f64 / finished as f64
            } else {
                0.0
            },
            min_duration_ms: d.min_ms,
            max_duration_ms: d.max_ms,
            runtime,
            items_per_minute: if runtime.as_secs_f64() > 0.0 {
                finished as f64 / (runtime.as_secs_f64() / 60.0)
            } else {
                0.0
            },
        }
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of crawl statistics
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub items_finished: u64,
    pub items_failed: u64,
    pub items_skipped: u64,
    pub retries_scheduling: u64,
    pub retries_transport: u64,
    pub avg_duration_ms: f64,
    pub min_duration_ms: u64,
    pub max_duration_ms: u64,
    pub runtime: Duration,
    pub items_per_minute: f64,
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Crawl Statistics")?;
        writeln!(f, "  runtime  : {:?}", self.runtime)?;
        writeln!(
            f,
            "  items    : finished: {}, failed: {}, skipped: {}",
            self.items_finished, self.items_failed, self.items_skipped
        )?;
        writeln!(
            f,
            "  retries  : scheduling: {}, transport: {}",
            self.retries_scheduling, self.retries_transport
        )?;
        writeln!(
            f,
            "  duration : avg: {:.1}ms, min: {}ms, max: {}ms",
            self.avg_duration_ms, self.min_duration_ms, self.max_duration_ms
        )?;
        write!(f, "  rate     : {:.2} items/min", self.items_per_minute)
    }
}
