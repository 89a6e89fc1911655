//! Crawl coordinator - main crawl orchestration logic
//!
//! The coordinator runs the main loop that drains the frontier through the
//! worker pool:
//! - enforcing the per-crawl request and wall-clock ceilings
//! - skipping blocked URLs before they reach the executor
//! - submitting the per-item pipeline (delay, session, hooks, executor,
//!   handler) as pool tasks
//! - deciding retries, finalization and failure-handler invocation
//! - draining in-flight work before reporting final statistics

use crate::config::Config;
use crate::crawler::hooks::run_hooks;
use crate::crawler::{CrawlContext, Executor, FailureHandler, Hook, RequestHandler};
use crate::frontier::Frontier;
use crate::pool::{AutoscaledPool, SysinfoProbe, SystemProbe};
use crate::request::{WorkItem, WorkState};
use crate::retry::{RetryPolicy, SchedulingVerdict};
use crate::session::SessionPool;
use crate::stats::{StatsAggregator, StatsSnapshot};
use crate::storage::{Dataset, KeyValueStore, MemoryDataset, MemoryKeyValueStore};
use crate::DriftnetError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Lifecycle state of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Idle,
    Running,
    Draining,
    Stopped,
}

/// Main crawl coordinator
///
/// Handlers, hooks and sinks are registered before [`run`](Self::run); the
/// run itself only needs `&self`, so a `Crawler` can be shared behind an
/// `Arc` with code that calls [`stop`](Self::stop) or reads statistics.
pub struct Crawler {
    config: Config,
    frontier: Arc<Frontier>,
    sessions: Arc<SessionPool>,
    stats: Arc<StatsAggregator>,
    executor: Arc<dyn Executor>,
    probe: Arc<dyn SystemProbe>,
    handler: Option<Arc<dyn RequestHandler>>,
    failure_handler: Option<Arc<dyn FailureHandler>>,
    pre_hooks: Vec<Arc<dyn Hook>>,
    post_hooks: Vec<Arc<dyn Hook>>,
    dataset: Arc<dyn Dataset>,
    key_value_store: Arc<dyn KeyValueStore>,
    state: Mutex<CrawlState>,
    stop_requested: AtomicBool,
}

impl Crawler {
    /// Creates a crawler with in-memory sinks and the host load probe
    pub fn new(config: Config, executor: Arc<dyn Executor>) -> Self {
        let sessions = Arc::new(SessionPool::new(config.session_pool_options()));
        Self {
            config,
            frontier: Arc::new(Frontier::new()),
            sessions,
            stats: Arc::new(StatsAggregator::new()),
            executor,
            probe: Arc::new(SysinfoProbe::new()),
            handler: None,
            failure_handler: None,
            pre_hooks: Vec::new(),
            post_hooks: Vec::new(),
            dataset: Arc::new(MemoryDataset::new()),
            key_value_store: Arc::new(MemoryKeyValueStore::new()),
            state: Mutex::new(CrawlState::Idle),
            stop_requested: AtomicBool::new(false),
        }
    }

    /// Registers the handler invoked for every successful fetch
    pub fn set_request_handler(&mut self, handler: Arc<dyn RequestHandler>) {
        self.handler = Some(handler);
    }

    /// Registers the handler invoked once per permanently failed item
    pub fn set_failure_handler(&mut self, handler: Arc<dyn FailureHandler>) {
        self.failure_handler = Some(handler);
    }

    /// Appends a hook that runs before the executor
    pub fn add_pre_hook(&mut self, hook: Arc<dyn Hook>) {
        self.pre_hooks.push(hook);
    }

    /// Appends a hook that runs after the executor, before the handler
    pub fn add_post_hook(&mut self, hook: Arc<dyn Hook>) {
        self.post_hooks.push(hook);
    }

    /// Replaces the dataset sink
    pub fn set_dataset(&mut self, dataset: Arc<dyn Dataset>) {
        self.dataset = dataset;
    }

    /// Replaces the key-value sink
    pub fn set_key_value_store(&mut self, store: Arc<dyn KeyValueStore>) {
        self.key_value_store = store;
    }

    /// Replaces the load probe used by the worker pool
    pub fn set_probe(&mut self, probe: Arc<dyn SystemProbe>) {
        self.probe = probe;
    }

    /// The frontier backing this crawler
    pub fn frontier(&self) -> Arc<Frontier> {
        Arc::clone(&self.frontier)
    }

    /// The statistics aggregator backing this crawler
    pub fn stats(&self) -> Arc<StatsAggregator> {
        Arc::clone(&self.stats)
    }

    /// The session pool backing this crawler
    pub fn sessions(&self) -> Arc<SessionPool> {
        Arc::clone(&self.sessions)
    }

    /// Current lifecycle state
    pub fn state(&self) -> CrawlState {
        *self.state.lock().unwrap()
    }

    /// Requests a cooperative stop
    ///
    /// The main loop stops fetching new items; in-flight work drains
    /// normally.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    /// Runs the crawl to completion
    ///
    /// Fails synchronously when no request handler is registered. Seeds from
    /// the configuration are enqueued first (duplicates of already handled
    /// keys are dropped, so a re-run over a drained frontier finishes
    /// immediately). Returns the final statistics snapshot.
    pub async fn run(&self) -> crate::Result<StatsSnapshot> {
        let handler = self.handler.clone().ok_or(DriftnetError::NoHandler)?;

        self.stop_requested.store(false, Ordering::Release);
        *self.state.lock().unwrap() = CrawlState::Running;

        let max_retries = self.config.crawl.max_retries;
        let seeded = self.frontier.enqueue_all(
            self.config
                .seeds
                .iter()
                .map(|seed| WorkItem::new(seed).with_max_retries(max_retries)),
        );
        tracing::info!(
            "Crawl starting: {} seeds enqueued, {} pending",
            seeded,
            self.frontier.pending_count()
        );

        let pool = Arc::new(AutoscaledPool::new(
            self.config.pool_options(),
            Arc::clone(&self.probe),
        ));
        {
            let frontier = Arc::clone(&self.frontier);
            pool.start(move || frontier.pending_count());
        }
        let sweeper = self.sessions.start_sweeper();

        let shared = Arc::new(TaskShared {
            frontier: Arc::clone(&self.frontier),
            sessions: Arc::clone(&self.sessions),
            stats: Arc::clone(&self.stats),
            executor: Arc::clone(&self.executor),
            failure_handler: self.failure_handler.clone(),
            pre_hooks: self.pre_hooks.clone(),
            post_hooks: self.post_hooks.clone(),
            dataset: Arc::clone(&self.dataset),
            key_value_store: Arc::clone(&self.key_value_store),
            retry_policy: self.config.retry_policy(),
            request_delay: Duration::from_millis(self.config.crawl.request_delay_ms),
            finalized: AtomicU64::new(0),
        });

        let started = Instant::now();
        let max_requests = self.config.crawl.max_requests_per_crawl;
        let max_time = self
            .config
            .crawl
            .max_crawl_time_secs
            .map(Duration::from_secs);

        loop {
            if self.stop_requested.load(Ordering::Acquire) {
                tracing::info!("Stop requested, draining");
                break;
            }
            if let Some(limit) = max_requests {
                if shared.finalized.load(Ordering::Acquire) >= limit {
                    tracing::info!("Reached max requests per crawl ({})", limit);
                    break;
                }
            }
            if let Some(limit) = max_time {
                if started.elapsed() >= limit {
                    tracing::info!("Reached max crawl time ({:?})", limit);
                    break;
                }
            }

            // Keep the pool queue shallow so finalization counts stay
            // meaningful against the ceilings above
            if pool.queued() >= pool.desired_concurrency() {
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }

            match self.frontier.fetch_next() {
                Some(mut item) => {
                    if is_blocked(&self.config.crawl.blocked_url_patterns, &item.url) {
                        tracing::debug!("Skipping blocked URL {}", item.url);
                        self.frontier.mark_handled(&mut item);
                        shared.finalized.fetch_add(1, Ordering::AcqRel);
                        self.stats.record_skipped();
                        continue;
                    }

                    let task_shared = Arc::clone(&shared);
                    let task_handler = Arc::clone(&handler);
                    if pool
                        .submit(async move { process_item(task_shared, task_handler, item).await })
                        .is_err()
                    {
                        break;
                    }
                }
                None => {
                    if self.frontier.is_empty() && pool.is_idle() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }

        *self.state.lock().unwrap() = CrawlState::Draining;
        while !pool.is_idle() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        pool.stop();
        sweeper.abort();
        *self.state.lock().unwrap() = CrawlState::Stopped;

        let snapshot = self.stats.snapshot();
        tracing::info!("Crawl finished\n{}", snapshot);
        Ok(snapshot)
    }
}

fn is_blocked(patterns: &[String], url: &str) -> bool {
    patterns.iter().any(|pattern| url.contains(pattern))
}

/// State shared by every pool task of one run
struct TaskShared {
    frontier: Arc<Frontier>,
    sessions: Arc<SessionPool>,
    stats: Arc<StatsAggregator>,
    executor: Arc<dyn Executor>,
    failure_handler: Option<Arc<dyn FailureHandler>>,
    pre_hooks: Vec<Arc<dyn Hook>>,
    post_hooks: Vec<Arc<dyn Hook>>,
    dataset: Arc<dyn Dataset>,
    key_value_store: Arc<dyn KeyValueStore>,
    retry_policy: RetryPolicy,
    request_delay: Duration,

    /// Items finalized this run, for the max-requests ceiling
    finalized: AtomicU64,
}

/// The per-item pipeline, one invocation per scheduling attempt
async fn process_item(
    shared: Arc<TaskShared>,
    handler: Arc<dyn RequestHandler>,
    item: WorkItem,
) -> crate::Result<()> {
    let started = Instant::now();

    if !shared.request_delay.is_zero() {
        tokio::time::sleep(shared.request_delay).await;
    }

    let session = shared.sessions.get_session();
    let mut ctx = CrawlContext::new(
        item,
        Arc::clone(&shared.frontier),
        Arc::clone(&shared.dataset),
        Arc::clone(&shared.key_value_store),
    );
    ctx.session = Some(session.clone());

    match execute_attempt(&shared, &handler, &mut ctx).await {
        Ok(()) => {
            shared.sessions.mark_good(&session.id);
            shared.sessions.return_session(&session);

            let mut item = ctx.item;
            shared.frontier.mark_handled(&mut item);
            shared.finalized.fetch_add(1, Ordering::AcqRel);
            shared.stats.record_finished(started.elapsed());
            tracing::debug!("Handled {}", item.url);
            Ok(())
        }
        Err(error) => {
            shared.sessions.mark_bad(&session.id, &error.to_string());
            shared.sessions.return_session(&session);
            ctx.item.push_error_message(error.to_string());

            match shared.retry_policy.scheduling_verdict(&ctx.item) {
                SchedulingVerdict::Reclaim(delay) => {
                    let mut item = ctx.item;
                    item.retry_count += 1;
                    shared.stats.record_scheduling_retry();
                    tracing::warn!(
                        "Attempt {}/{} failed for {}: {}",
                        item.retry_count,
                        item.max_retries,
                        item.url,
                        error
                    );
                    tokio::time::sleep(delay).await;
                    shared.frontier.reclaim(item);
                    Ok(())
                }
                SchedulingVerdict::GiveUp => {
                    ctx.item.state = WorkState::Failed;
                    tracing::warn!(
                        "Giving up on {} after {} attempts: {}",
                        ctx.item.url,
                        ctx.item.retry_count + 1,
                        error
                    );

                    if let Some(failure_handler) = &shared.failure_handler {
                        if let Err(e) = failure_handler.handle(&mut ctx, &error).await {
                            tracing::error!("Failure handler error for {}: {}", ctx.item.url, e);
                        }
                    }

                    let mut item = ctx.item;
                    shared.frontier.mark_handled(&mut item);
                    shared.finalized.fetch_add(1, Ordering::AcqRel);
                    shared.stats.record_failed();
                    Ok(())
                }
            }
        }
    }
}

/// One scheduling attempt: pre-hooks, transport loop, post-hooks, handler
async fn execute_attempt(
    shared: &TaskShared,
    handler: &Arc<dyn RequestHandler>,
    ctx: &mut CrawlContext,
) -> crate::Result<()> {
    run_hooks(&shared.pre_hooks, ctx).await?;

    let mut attempt = 0u32;
    let response = loop {
        let result = shared.executor.execute(&ctx.item, ctx.session.as_ref()).await;
        let failure = match result {
            Ok(response) if response.is_success() => break response,
            Ok(response) => DriftnetError::HttpStatus {
                url: ctx.item.url.clone(),
                status: response.status,
            },
            Err(error) => error,
        };

        if !shared.retry_policy.should_retry_transport(attempt) {
            return Err(failure);
        }
        let backoff = shared.retry_policy.transport_backoff(attempt);
        attempt += 1;
        shared.stats.record_transport_retry();
        tracing::warn!(
            "Transport retry {} for {} in {:?}: {}",
            attempt,
            ctx.item.url,
            backoff,
            failure
        );
        tokio::time::sleep(backoff).await;
    };

    ctx.response = Some(response);
    run_hooks(&shared.post_hooks, ctx).await?;
    handler.handle(ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::FetchResponse;
    use crate::pool::FixedProbe;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU32;

    /// Executor fixture returning canned statuses per URL
    struct StubExecutor {
        calls: AtomicU32,
        bodies: HashMap<String, String>,
        failing: Vec<String>,
    }

    impl StubExecutor {
        fn ok() -> Self {
            Self {
                calls: AtomicU32::new(0),
                bodies: HashMap::new(),
                failing: Vec::new(),
            }
        }

        fn with_body(mut self, url: &str, body: &str) -> Self {
            self.bodies.insert(url.to_string(), body.to_string());
            self
        }

        fn failing_on(mut self, pattern: &str) -> Self {
            self.failing.push(pattern.to_string());
            self
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Executor for StubExecutor {
        async fn execute(
            &self,
            item: &WorkItem,
            _session: Option<&crate::session::Session>,
        ) -> crate::Result<FetchResponse> {
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

    struct CountingHandler {
        handled: AtomicU32,
    }

    #[async_trait]
    impl RequestHandler for CountingHandler {
        async fn handle(&self, _ctx: &mut CrawlContext) -> crate::Result<()> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CountingFailureHandler {
        invoked: AtomicU32,
    }

    #[async_trait]
    impl FailureHandler for CountingFailureHandler {
        async fn handle(
            &self,
            _ctx: &mut CrawlContext,
            _error: &DriftnetError,
        ) -> crate::Result<()> {
            self.invoked.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.crawl.max_retries = 2;
        config.crawl.retry_delay_ms = 5;
        config.http.max_transport_retries = 1;
        config.http.backoff_base_ms = 1;
        config.http.backoff_fixed_ms = 1;
        config.pool.initial_concurrency = 2;
        config.pool.autoscale_interval_secs = 3600;
        config
    }

    fn crawler_with(config: Config, executor: Arc<dyn Executor>) -> Crawler {
        let mut crawler = Crawler::new(config, executor);
        crawler.set_probe(Arc::new(FixedProbe::new(0.1, 0.2)));
        crawler
    }

    #[tokio::test]
    async fn test_run_without_handler_fails_fast() {
        let crawler = crawler_with(fast_config(), Arc::new(StubExecutor::ok()));
        let result = crawler.run().await;
        assert!(matches!(result, Err(DriftnetError::NoHandler)));
        assert_eq!(crawler.state(), CrawlState::Idle);
    }

    #[tokio::test]
    async fn test_crawl_handles_all_seeds_once() {
        let mut config = fast_config();
        config.seeds = vec![
            "https://example.com/a".to_string(),
            "https://example.com/b".to_string(),
            "https://example.com/c".to_string(),
            // Duplicate of the first seed after normalization
            "https://WWW.example.com/a/".to_string(),
        ];

        let executor = Arc::new(StubExecutor::ok());
        let handler = Arc::new(CountingHandler {
            handled: AtomicU32::new(0),
        });
        let mut crawler = crawler_with(config, executor.clone());
        crawler.set_request_handler(handler.clone());

        let snapshot = crawler.run().await.unwrap();
        assert_eq!(handler.handled.load(Ordering::SeqCst), 3);
        assert_eq!(snapshot.items_finished, 3);
        assert_eq!(snapshot.items_failed, 0);
        assert_eq!(crawler.frontier().handled_count(), 3);
        assert!(crawler.frontier().is_empty());
        assert_eq!(crawler.state(), CrawlState::Stopped);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_runs_failure_handler_once() {
        let mut config = fast_config();
        config.seeds = vec!["https://example.com/broken".to_string()];

        let executor = Arc::new(StubExecutor::ok().failing_on("/broken"));
        let handler = Arc::new(CountingHandler {
            handled: AtomicU32::new(0),
        });
        let failure = Arc::new(CountingFailureHandler {
            invoked: AtomicU32::new(0),
        });
        let mut crawler = crawler_with(config, executor.clone());
        crawler.set_request_handler(handler.clone());
        crawler.set_failure_handler(failure.clone());

        let snapshot = crawler.run().await.unwrap();
        assert_eq!(handler.handled.load(Ordering::SeqCst), 0);
        assert_eq!(failure.invoked.load(Ordering::SeqCst), 1);
        assert_eq!(snapshot.items_failed, 1);
        // (max_retries + 1) scheduling attempts, each with 1 transport retry
        assert_eq!(executor.calls(), 6);
        assert_eq!(snapshot.retries_scheduling, 2);
        assert_eq!(snapshot.retries_transport, 3);
    }

    #[tokio::test]
    async fn test_failure_handler_error_does_not_abort_run() {
        struct ExplodingFailureHandler;

        #[async_trait]
        impl FailureHandler for ExplodingFailureHandler {
            async fn handle(
                &self,
                _ctx: &mut CrawlContext,
                _error: &DriftnetError,
            ) -> crate::Result<()> {
                Err(DriftnetError::Handler("failure handler broke".to_string()))
            }
        }

        let mut config = fast_config();
        config.seeds = vec![
            "https://example.com/broken".to_string(),
            "https://example.com/fine".to_string(),
        ];

        let handler = Arc::new(CountingHandler {
            handled: AtomicU32::new(0),
        });
        let mut crawler =
            crawler_with(config, Arc::new(StubExecutor::ok().failing_on("/broken")));
        crawler.set_request_handler(handler.clone());
        crawler.set_failure_handler(Arc::new(ExplodingFailureHandler));

        let snapshot = crawler.run().await.unwrap();
        assert_eq!(snapshot.items_failed, 1);
        assert_eq!(snapshot.items_finished, 1);
        assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blocked_urls_are_skipped_without_fetching() {
        let mut config = fast_config();
        config.crawl.blocked_url_patterns = vec!["/admin".to_string()];
        config.seeds = vec![
            "https://example.com/admin/panel".to_string(),
            "https://example.com/public".to_string(),
        ];

        let executor = Arc::new(StubExecutor::ok());
        let handler = Arc::new(CountingHandler {
            handled: AtomicU32::new(0),
        });
        let mut crawler = crawler_with(config, executor.clone());
        crawler.set_request_handler(handler.clone());

        let snapshot = crawler.run().await.unwrap();
        assert_eq!(snapshot.items_skipped, 1);
        assert_eq!(snapshot.items_finished, 1);
        assert_eq!(executor.calls(), 1);
        // Both items are finalized
        assert_eq!(crawler.frontier().handled_count(), 2);
    }

    #[tokio::test]
    async fn test_max_requests_per_crawl_stops_fetching() {
        let mut config = fast_config();
        config.crawl.max_requests_per_crawl = Some(2);
        config.pool.initial_concurrency = 1;
        config.pool.min_concurrency = 1;
        config.pool.max_concurrency = 1;
        config.seeds = (0..10)
            .map(|n| format!("https://example.com/page-{}", n))
            .collect();

        let handler = Arc::new(CountingHandler {
            handled: AtomicU32::new(0),
        });
        let mut crawler = crawler_with(config, Arc::new(StubExecutor::ok()));
        crawler.set_request_handler(handler.clone());

        let snapshot = crawler.run().await.unwrap();
        // The ceiling is checked between dispatches; with one worker at most
        // one extra item slips in while the second finalizes
        assert!(snapshot.items_finished >= 2);
        assert!(snapshot.items_finished <= 3);
        assert!(crawler.frontier().pending_count() >= 7);
    }

    #[tokio::test]
    async fn test_rerun_over_drained_frontier_is_idempotent() {
        let mut config = fast_config();
        config.seeds = vec!["https://example.com/only".to_string()];

        let executor = Arc::new(StubExecutor::ok());
        let handler = Arc::new(CountingHandler {
            handled: AtomicU32::new(0),
        });
        let mut crawler = crawler_with(config, executor.clone());
        crawler.set_request_handler(handler.clone());

        crawler.run().await.unwrap();
        crawler.run().await.unwrap();

        // The seed was already handled, so the second run fetched nothing
        assert_eq!(executor.calls(), 1);
        assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
        assert_eq!(crawler.state(), CrawlState::Stopped);
    }

    struct LinkFollowingHandler;

    #[async_trait]
    impl RequestHandler for LinkFollowingHandler {
        async fn handle(&self, ctx: &mut CrawlContext) -> crate::Result<()> {
            if let Some(response) = &ctx.response {
                let links = crate::crawler::extract_links(&response.body, &response.url);
                ctx.enqueue_links(links);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_discovered_links_feed_back_into_the_frontier() {
        let mut config = fast_config();
        config.seeds = vec!["https://example.com/".to_string()];

        let executor = Arc::new(
            StubExecutor::ok().with_body(
                "https://example.com/",
                r#"<a href="/next">next</a><a href="/">self</a>"#,
            ),
        );
        let mut crawler = crawler_with(config, executor.clone());
        crawler.set_request_handler(Arc::new(LinkFollowingHandler));

        let snapshot = crawler.run().await.unwrap();
        // Seed plus the discovered /next; the self-link is a duplicate
        assert_eq!(snapshot.items_finished, 2);
        assert_eq!(executor.calls(), 2);
        assert_eq!(crawler.frontier().handled_count(), 2);
    }
}
