//! Work item model
//!
//! A [`WorkItem`] is one unit of crawlable work (a URL plus request metadata)
//! tracked through its lifecycle by the frontier. Items are identified by a
//! `unique_key` derived from the normalized URL, so equivalent URLs are
//! scheduled at most once.

mod unique_key;

pub use unique_key::{normalize_url, unique_key_for};

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Lifecycle state of a work item
///
/// Transitions are `Unprocessed -> InProgress -> {Handled | Failed}`. A failed
/// item with retry budget left is reclaimed back to `Unprocessed`; a handled
/// item never re-enters the frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkState {
    Unprocessed,
    InProgress,
    Handled,
    Failed,
}

/// A unit of crawlable work
///
/// The scheduling fields (`retry_count`, `state`, `error_messages`) are
/// mutated by the orchestrator; the payload fields (method, headers, body)
/// are opaque to the scheduler and only interpreted by the executor.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Deduplication identity; defaults to the normalized URL
    pub unique_key: String,

    /// The URL to fetch
    pub url: String,

    /// HTTP method (GET unless overridden)
    pub method: String,

    /// Extra request headers
    pub headers: HashMap<String, String>,

    /// Optional request body
    pub body: Option<String>,

    /// Arbitrary user data carried through to the handler
    pub user_data: HashMap<String, serde_json::Value>,

    /// Optional routing label for handlers
    pub label: Option<String>,

    /// Priority value, accepted but not used for ordering (FIFO by insertion)
    pub priority: i32,

    /// Number of scheduling-level retries performed so far
    pub retry_count: u32,

    /// Maximum number of scheduling-level retries before giving up
    pub max_retries: u32,

    /// Current lifecycle state
    pub state: WorkState,

    /// Error messages accumulated across failed attempts, oldest first
    pub error_messages: Vec<String>,

    /// When this item was created
    pub created_at: DateTime<Utc>,

    /// When this item was finalized (success or permanent failure)
    pub handled_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    /// Creates a GET work item for the given URL
    ///
    /// The unique key is derived from the normalized URL. A URL that fails
    /// normalization keeps its raw form as the key, so it can still be
    /// scheduled (and will fail in the executor with a proper error).
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let unique_key = unique_key_for(&url, "GET", None);
        Self {
            unique_key,
            url,
            method: "GET".to_string(),
            headers: HashMap::new(),
            body: None,
            user_data: HashMap::new(),
            label: None,
            priority: 0,
            retry_count: 0,
            max_retries: 3,
            state: WorkState::Unprocessed,
            error_messages: Vec::new(),
            created_at: Utc::now(),
            handled_at: None,
        }
    }

    /// Creates a work item with an explicit method and body
    ///
    /// Non-GET items fold a digest of the method and body into the unique
    /// key, so two POSTs to the same URL with different payloads are distinct
    /// units of work.
    pub fn with_payload(
        url: impl Into<String>,
        method: impl Into<String>,
        body: Option<String>,
    ) -> Self {
        let url = url.into();
        let method = method.into();
        let unique_key = unique_key_for(&url, &method, body.as_deref());
        Self {
            unique_key,
            method,
            body,
            ..Self::new(url)
        }
    }

    /// Overrides the unique key
    pub fn with_unique_key(mut self, key: impl Into<String>) -> Self {
        self.unique_key = key.into();
        self
    }

    /// Sets the maximum number of scheduling retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the routing label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Attaches a user data entry
    pub fn with_user_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.user_data.insert(key.into(), value);
        self
    }

    /// Records an error message from a failed attempt
    pub fn push_error_message(&mut self, message: impl Into<String>) {
        self.error_messages.push(message.into());
    }

    /// Returns true if the item still has scheduling retry budget left
    pub fn has_retries_left(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_item_defaults() {
        let item = WorkItem::new("https://example.com/page");
        assert_eq!(item.method, "GET");
        assert_eq!(item.retry_count, 0);
        assert_eq!(item.state, WorkState::Unprocessed);
        assert!(item.error_messages.is_empty());
        assert!(item.handled_at.is_none());
    }

    #[test]
    fn test_unique_key_is_normalized_url() {
        let item = WorkItem::new("HTTP://WWW.Example.com/page/");
        assert_eq!(item.unique_key, "http://example.com/page");
    }

    #[test]
    fn test_equivalent_urls_share_key() {
        let a = WorkItem::new("https://example.com/a?b=2&a=1");
        let b = WorkItem::new("https://example.com/a?a=1&b=2");
        assert_eq!(a.unique_key, b.unique_key);
    }

    #[test]
    fn test_post_payload_distinguishes_key() {
        let get = WorkItem::new("https://example.com/api");
        let post_a = WorkItem::with_payload(
            "https://example.com/api",
            "POST",
            Some("{\"q\":1}".to_string()),
        );
        let post_b = WorkItem::with_payload(
            "https://example.com/api",
            "POST",
            Some("{\"q\":2}".to_string()),
        );
        assert_ne!(get.unique_key, post_a.unique_key);
        assert_ne!(post_a.unique_key, post_b.unique_key);
    }

    #[test]
    fn test_with_unique_key_override() {
        let item = WorkItem::new("https://example.com/").with_unique_key("custom");
        assert_eq!(item.unique_key, "custom");
    }

    #[test]
    fn test_push_error_message_preserves_order() {
        let mut item = WorkItem::new("https://example.com/");
        item.push_error_message("first");
        item.push_error_message("second");
        assert_eq!(item.error_messages, vec!["first", "second"]);
    }

    #[test]
    fn test_has_retries_left() {
        let mut item = WorkItem::new("https://example.com/").with_max_retries(2);
        assert!(item.has_retries_left());
        item.retry_count = 2;
        assert!(!item.has_retries_left());
    }
}
