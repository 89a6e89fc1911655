//! Deduplicating work frontier
//!
//! The frontier owns every queued work item and tracks three disjoint sets of
//! unique keys: pending (FIFO), in-flight and handled. A key is present in at
//! most one of them, and the composite state is guarded by a single mutex so
//! the duplicate check and insert are one atomic step.
//!
//! None of the operations await while holding the lock, so the frontier can
//! be shared freely between the orchestrator loop and executing tasks.

use crate::request::{WorkItem, WorkState};
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
struct FrontierInner {
    /// Storage for items that are pending or in flight, keyed by unique key
    items: HashMap<String, WorkItem>,

    /// Unique keys awaiting dispatch, in insertion order
    pending: VecDeque<String>,

    /// Unique keys currently being executed
    in_flight: HashSet<String>,

    /// Unique keys that have been finalized and must never be re-enqueued
    handled: HashSet<String>,
}

/// Deduplicating FIFO queue of work items with in-flight tracking
#[derive(Default)]
pub struct Frontier {
    inner: Mutex<FrontierInner>,
}

impl Frontier {
    /// Creates an empty frontier
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a work item to the pending queue
    ///
    /// A key already present in the pending, in-flight or handled sets is
    /// silently ignored; duplicate enqueues are not an error. Returns whether
    /// the item was accepted.
    pub fn enqueue(&self, item: WorkItem) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let key = item.unique_key.clone();

        if inner.items.contains_key(&key)
            || inner.in_flight.contains(&key)
            || inner.handled.contains(&key)
        {
            tracing::debug!("Duplicate enqueue ignored: {}", key);
            return false;
        }

        inner.pending.push_back(key.clone());
        inner.items.insert(key, item);
        true
    }

    /// Adds several work items, returning how many were accepted
    pub fn enqueue_all(&self, items: impl IntoIterator<Item = WorkItem>) -> usize {
        items
            .into_iter()
            .map(|i| self.enqueue(i))
            .filter(|accepted| *accepted)
            .count()
    }

    /// Atomically pops the head of the pending queue and moves it in flight
    ///
    /// Returns `None` when no item is pending. In-flight items are not
    /// fetchable until reclaimed.
    pub fn fetch_next(&self) -> Option<WorkItem> {
        let mut inner = self.inner.lock().unwrap();
        let key = inner.pending.pop_front()?;
        let mut item = inner.items.remove(&key)?;
        item.state = WorkState::InProgress;
        inner.in_flight.insert(key);
        Some(item)
    }

    /// Finalizes an item, removing it from the in-flight set
    ///
    /// The key joins the handled set, so the item can never be scheduled
    /// again. Used for both successful and permanently failed items.
    pub fn mark_handled(&self, item: &mut WorkItem) {
        let mut inner = self.inner.lock().unwrap();
        inner.in_flight.remove(&item.unique_key);
        inner.handled.insert(item.unique_key.clone());
        if item.state != WorkState::Failed {
            item.state = WorkState::Handled;
        }
        item.handled_at = Some(Utc::now());
    }

    /// Returns a failed in-flight item to the tail of the pending queue
    ///
    /// A key that is not currently in flight is ignored; reclaim is only
    /// meaningful for the task that fetched the item.
    pub fn reclaim(&self, mut item: WorkItem) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.in_flight.remove(&item.unique_key) {
            return;
        }
        item.state = WorkState::Unprocessed;
        let key = item.unique_key.clone();
        inner.pending.push_back(key);
        inner.items.insert(item.unique_key.clone(), item);
    }

    /// True iff nothing is pending and nothing is in flight
    ///
    /// A frontier with in-flight work is not empty: a running task might
    /// still reclaim its item.
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.pending.is_empty() && inner.in_flight.is_empty()
    }

    /// Total number of distinct keys seen (pending + in flight + handled)
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.pending.len() + inner.in_flight.len() + inner.handled.len()
    }

    /// Number of items awaiting dispatch
    pub fn pending_count(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }

    /// Number of items currently executing
    pub fn in_flight_count(&self) -> usize {
        self.inner.lock().unwrap().in_flight.len()
    }

    /// Number of finalized items
    pub fn handled_count(&self) -> usize {
        self.inner.lock().unwrap().handled.len()
    }
}
