//! Crawl orchestration
//!
//! This module wires the frontier, worker pool, session pool and statistics
//! into a crawl run:
//! - [`Crawler`] owns the main loop and the per-item execution pipeline
//! - [`Executor`] abstracts the transport; [`HttpExecutor`] is the default
//! - [`Hook`] middleware runs before and after the executor
//! - [`CrawlContext`] is the per-item view handed to hooks and handlers

mod coordinator;
mod executor;
mod hooks;
mod parser;

pub use coordinator::{CrawlState, Crawler};
pub use executor::{Executor, FetchResponse, HttpExecutor};
pub use hooks::Hook;
pub use parser::extract_links;

use crate::frontier::Frontier;
use crate::request::WorkItem;
use crate::session::Session;
use crate::storage::{Dataset, KeyValueStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-item state passed through hooks and handlers
///
/// The context owns a working copy of the item; mutations (headers, user
/// data) are carried through the attempt and back into the frontier on
/// finalization. `response` is `None` in pre-hooks and populated afterwards.
pub struct CrawlContext {
    /// The item being processed
    pub item: WorkItem,

    /// The executor's response, once available
    pub response: Option<FetchResponse>,

    /// Clone of the session used for this attempt
    pub session: Option<Session>,

    /// Append-only result sink
    pub dataset: Arc<dyn Dataset>,

    /// Named-blob sink
    pub key_value_store: Arc<dyn KeyValueStore>,

    /// Scratch space shared between hooks and the handler for one attempt
    pub state: HashMap<String, serde_json::Value>,

    frontier: Arc<Frontier>,
}

impl CrawlContext {
    pub(crate) fn new(
        item: WorkItem,
        frontier: Arc<Frontier>,
        dataset: Arc<dyn Dataset>,
        key_value_store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            item,
            response: None,
            session: None,
            dataset,
            key_value_store,
            state: HashMap::new(),
            frontier,
        }
    }

    /// Enqueues discovered URLs as new GET work items
    ///
    /// Items inherit the current item's retry budget. Returns how many were
    /// accepted; duplicates of known keys are dropped silently.
    pub fn enqueue_links<I, S>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let max_retries = self.item.max_retries;
        self.frontier.enqueue_all(
            urls.into_iter()
                .map(|url| WorkItem::new(url).with_max_retries(max_retries)),
        )
    }

    /// Enqueues a fully built work item
    pub fn enqueue(&self, item: WorkItem) -> bool {
        self.frontier.enqueue(item)
    }

    /// Appends one record to the dataset
    pub fn push_data(&self, value: serde_json::Value) -> crate::Result<()> {
        self.dataset.push(value)?;
        Ok(())
    }

    /// Stores a named value in the key-value sink
    pub fn set_value(&self, key: &str, value: serde_json::Value) -> crate::Result<()> {
        self.key_value_store.set(key, value)?;
        Ok(())
    }
}

/// User callback invoked for each successfully fetched item
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, ctx: &mut CrawlContext) -> crate::Result<()>;
}

/// User callback invoked exactly once when an item permanently fails
#[async_trait]
pub trait FailureHandler: Send + Sync {
    async fn handle(&self, ctx: &mut CrawlContext, error: &crate::DriftnetError)
        -> crate::Result<()>;
}
