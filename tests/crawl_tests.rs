//! End-to-end crawl tests over a stub transport
//!
//! These tests drive the whole pipeline (frontier, pool, sessions, hooks,
//! retry, statistics) through the public API, with a canned executor standing
//! in for HTTP.

use async_trait::async_trait;
use driftnet::crawler::Hook;
use driftnet::pool::FixedProbe;
use driftnet::storage::{Dataset, MemoryDataset};
use driftnet::{
    Config, CrawlContext, Crawler, DriftnetError, Executor, FailureHandler, FetchResponse,
    RequestHandler, Session, WorkItem,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Executor returning canned responses, HTTP 500 for matching URLs
struct CannedExecutor {
    calls: AtomicU32,
    failing: Vec<String>,
    bodies: HashMap<String, String>,
}

impl CannedExecutor {
    fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            failing: Vec::new(),
            bodies: HashMap::new(),
        }
    }

    fn failing_on(mut self, pattern: &str) -> Self {
        self.failing.push(pattern.to_string());
        self
    }

    fn with_body(mut self, url: &str, body: &str) -> Self {
        self.bodies.insert(url.to_string(), body.to_string());
        self
    }
}

#[async_trait]
impl Executor for CannedExecutor {
    async fn execute(
        &self,
        item: &WorkItem,
        _session: Option<&Session>,
    ) -> driftnet::Result<FetchResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let status = if self.failing.iter().any(|p| item.url.contains(p)) {
            500
        } else {
            200
        };
        Ok(FetchResponse {
            status,
            headers: HashMap::new(),
            body: self.bodies.get(&item.url).cloned().unwrap_or_default(),
            url: item.url.clone(),
            content_type: Some("text/html".to_string()),
            elapsed: Duration::from_millis(1),
        })
    }
}

fn fast_config(seeds: Vec<String>) -> Config {
    let mut config = Config::default();
    config.crawl.max_retries = 1;
    config.crawl.retry_delay_ms = 5;
    config.http.max_transport_retries = 0;
    config.http.backoff_base_ms = 1;
    config.http.backoff_fixed_ms = 1;
    config.pool.initial_concurrency = 2;
    config.pool.autoscale_interval_secs = 3600;
    config.seeds = seeds;
    config
}

fn build_crawler(config: Config, executor: Arc<dyn Executor>) -> Crawler {
    let mut crawler = Crawler::new(config, executor);
    crawler.set_probe(Arc::new(FixedProbe::new(0.1, 0.2)));
    crawler
}

struct RecordingHandler;

#[async_trait]
impl RequestHandler for RecordingHandler {
    async fn handle(&self, ctx: &mut CrawlContext) -> driftnet::Result<()> {
        let response = ctx.response.as_ref().expect("response must be set");
        ctx.push_data(json!({
            "url": response.url,
            "status": response.status,
        }))?;
        Ok(())
    }
}

#[tokio::test]
async fn test_crawl_records_every_seed_into_the_dataset() {
    let executor = Arc::new(CannedExecutor::new());
    let dataset = Arc::new(MemoryDataset::new());

    let mut crawler = build_crawler(
        fast_config(vec![
            "https://example.com/a".to_string(),
            "https://example.com/b".to_string(),
            "https://example.com/c".to_string(),
        ]),
        executor,
    );
    crawler.set_dataset(dataset.clone());
    crawler.set_request_handler(Arc::new(RecordingHandler));

    let snapshot = crawler.run().await.unwrap();

    assert_eq!(snapshot.items_finished, 3);
    assert_eq!(dataset.len().unwrap(), 3);
    let urls: Vec<String> = dataset
        .get_all()
        .unwrap()
        .iter()
        .map(|record| record["url"].as_str().unwrap().to_string())
        .collect();
    assert!(urls.contains(&"https://example.com/a".to_string()));
}

struct HeaderStampHook;

#[async_trait]
impl Hook for HeaderStampHook {
    async fn call(&self, ctx: &mut CrawlContext) -> driftnet::Result<()> {
        ctx.item
            .headers
            .insert("x-crawl-run".to_string(), "stamped".to_string());
        Ok(())
    }
}

struct AssertStampedHandler {
    seen: AtomicU32,
}

#[async_trait]
impl RequestHandler for AssertStampedHandler {
    async fn handle(&self, ctx: &mut CrawlContext) -> driftnet::Result<()> {
        if ctx.item.headers.get("x-crawl-run").map(String::as_str) == Some("stamped") {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_pre_hook_mutations_reach_the_handler() {
    let handler = Arc::new(AssertStampedHandler {
        seen: AtomicU32::new(0),
    });
    let mut crawler = build_crawler(
        fast_config(vec!["https://example.com/".to_string()]),
        Arc::new(CannedExecutor::new()),
    );
    crawler.add_pre_hook(Arc::new(HeaderStampHook));
    crawler.set_request_handler(handler.clone());

    crawler.run().await.unwrap();
    assert_eq!(handler.seen.load(Ordering::SeqCst), 1);
}

struct FailureProbe {
    invoked: AtomicU32,
    last_error_count: AtomicU32,
}

#[async_trait]
impl FailureHandler for FailureProbe {
    async fn handle(
        &self,
        ctx: &mut CrawlContext,
        _error: &DriftnetError,
    ) -> driftnet::Result<()> {
        self.invoked.fetch_add(1, Ordering::SeqCst);
        self.last_error_count
            .store(ctx.item.error_messages.len() as u32, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_failing_item_exhausts_budget_then_fails_permanently() {
    let executor = Arc::new(CannedExecutor::new().failing_on("/broken"));
    let failure = Arc::new(FailureProbe {
        invoked: AtomicU32::new(0),
        last_error_count: AtomicU32::new(0),
    });

    let mut config = fast_config(vec!["https://example.com/broken".to_string()]);
    config.crawl.max_retries = 2;
    config.http.max_transport_retries = 1;

    let mut crawler = build_crawler(config, executor.clone());
    crawler.set_request_handler(Arc::new(RecordingHandler));
    crawler.set_failure_handler(failure.clone());

    let snapshot = crawler.run().await.unwrap();

    assert_eq!(snapshot.items_failed, 1);
    assert_eq!(snapshot.items_finished, 0);
    assert_eq!(failure.invoked.load(Ordering::SeqCst), 1);
    // One error message per scheduling attempt
    assert_eq!(failure.last_error_count.load(Ordering::SeqCst), 3);
    // (2 + 1) scheduling attempts x (1 + 1) transport attempts
    assert_eq!(executor.calls.load(Ordering::SeqCst), 6);

    // A failed key is finalized; enqueueing it again is a no-op
    let frontier = crawler.frontier();
    assert!(!frontier.enqueue(WorkItem::new("https://example.com/broken")));
}

struct LinkFollower;

#[async_trait]
impl RequestHandler for LinkFollower {
    async fn handle(&self, ctx: &mut CrawlContext) -> driftnet::Result<()> {
        if let Some(response) = &ctx.response {
            let links = driftnet::crawler::extract_links(&response.body, &response.url);
            ctx.enqueue_links(links);
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_link_discovery_converges_on_a_cycle() {
    // a links to b, b links back to a; dedup must terminate the crawl
    let executor = Arc::new(
        CannedExecutor::new()
            .with_body("https://example.com/a", r#"<a href="/b">b</a>"#)
            .with_body("https://example.com/b", r#"<a href="/a">a</a>"#),
    );

    let mut crawler = build_crawler(
        fast_config(vec!["https://example.com/a".to_string()]),
        executor.clone(),
    );
    crawler.set_request_handler(Arc::new(LinkFollower));

    let snapshot = crawler.run().await.unwrap();
    assert_eq!(snapshot.items_finished, 2);
    assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    assert!(crawler.frontier().is_empty());
}

#[tokio::test]
async fn test_mixed_run_statistics_add_up() {
    let executor = Arc::new(CannedExecutor::new().failing_on("/flaky"));
    let mut config = fast_config(vec![
        "https://example.com/one".to_string(),
        "https://example.com/two".to_string(),
        "https://example.com/flaky".to_string(),
        "https://example.com/tracking/pixel".to_string(),
    ]);
    config.crawl.blocked_url_patterns = vec!["/tracking/".to_string()];

    let mut crawler = build_crawler(config, executor);
    crawler.set_request_handler(Arc::new(RecordingHandler));

    let snapshot = crawler.run().await.unwrap();
    assert_eq!(snapshot.items_finished, 2);
    assert_eq!(snapshot.items_failed, 1);
    assert_eq!(snapshot.items_skipped, 1);
    assert_eq!(snapshot.retries_scheduling, 1);
    assert!(snapshot.avg_duration_ms >= 0.0);
    assert_eq!(crawler.frontier().handled_count(), 4);
}
