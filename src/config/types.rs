use serde::Deserialize;
use std::time::Duration;

use crate::pool::PoolOptions;
use crate::retry::RetryPolicy;
use crate::session::SessionPoolOptions;

/// Main configuration structure for a crawl run
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawl: CrawlConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub sessions: SessionConfig,

    #[serde(default)]
    pub http: HttpConfig,

    /// Seed URLs enqueued before the run starts
    #[serde(default)]
    pub seeds: Vec<String>,
}

/// Crawl-level limits and scheduling behavior
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Ceiling on finalized items before the run drains; unset means unlimited
    #[serde(rename = "max-requests-per-crawl", default)]
    pub max_requests_per_crawl: Option<u64>,

    /// Wall-clock ceiling on the run in seconds; unset means unlimited
    #[serde(rename = "max-crawl-time-secs", default)]
    pub max_crawl_time_secs: Option<u64>,

    /// Scheduling-level retries per item
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before a failed item is re-queued (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Fixed politeness delay before each request (milliseconds)
    #[serde(rename = "request-delay-ms", default)]
    pub request_delay_ms: u64,

    /// Substring patterns; matching URLs are skipped without fetching
    #[serde(rename = "blocked-url-patterns", default)]
    pub blocked_url_patterns: Vec<String>,
}

/// Worker pool sizing and autoscaling
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    #[serde(rename = "min-concurrency", default = "default_min_concurrency")]
    pub min_concurrency: usize,

    #[serde(rename = "max-concurrency", default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(rename = "initial-concurrency", default = "default_initial_concurrency")]
    pub initial_concurrency: usize,

    /// Fraction of the ceiling added per scale-up step
    #[serde(rename = "scale-up-ratio", default = "default_scale_ratio")]
    pub scale_up_ratio: f64,

    /// Fraction of the ceiling removed per scale-down step
    #[serde(rename = "scale-down-ratio", default = "default_scale_ratio")]
    pub scale_down_ratio: f64,

    /// CPU ratio above which the pool refuses to grow
    #[serde(rename = "max-cpu-ratio", default = "default_max_cpu_ratio")]
    pub max_cpu_ratio: f64,

    /// Memory ratio above which the pool refuses to grow
    #[serde(rename = "max-memory-ratio", default = "default_max_memory_ratio")]
    pub max_memory_ratio: f64,

    #[serde(
        rename = "autoscale-interval-secs",
        default = "default_autoscale_interval_secs"
    )]
    pub autoscale_interval_secs: u64,
}

/// Session pool sizing and health thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(rename = "max-pool-size", default = "default_session_pool_size")]
    pub max_pool_size: usize,

    #[serde(rename = "session-ttl-secs", default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Error count at which a session is considered blocked
    #[serde(rename = "max-error-count", default = "default_session_max_errors")]
    pub max_error_count: u32,

    #[serde(rename = "sweep-interval-secs", default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// HTTP transport behavior
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Transport-level retries per execution attempt
    #[serde(
        rename = "max-transport-retries",
        default = "default_max_transport_retries"
    )]
    pub max_transport_retries: u32,

    /// Base of the exponential transport backoff (milliseconds)
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Fixed additive floor on every transport backoff delay (milliseconds)
    #[serde(rename = "backoff-fixed-ms", default = "default_backoff_fixed_ms")]
    pub backoff_fixed_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_min_concurrency() -> usize {
    1
}

fn default_max_concurrency() -> usize {
    32
}

fn default_initial_concurrency() -> usize {
    2
}

fn default_scale_ratio() -> f64 {
    0.5
}

fn default_max_cpu_ratio() -> f64 {
    0.95
}

fn default_max_memory_ratio() -> f64 {
    0.9
}

fn default_autoscale_interval_secs() -> u64 {
    10
}

fn default_session_pool_size() -> usize {
    1000
}

fn default_session_ttl_secs() -> u64 {
    1800
}

fn default_session_max_errors() -> u32 {
    5
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_user_agent() -> String {
    format!("driftnet/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_transport_retries() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_fixed_ms() -> u64 {
    1000
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_concurrency: default_min_concurrency(),
            max_concurrency: default_max_concurrency(),
            initial_concurrency: default_initial_concurrency(),
            scale_up_ratio: default_scale_ratio(),
            scale_down_ratio: default_scale_ratio(),
            max_cpu_ratio: default_max_cpu_ratio(),
            max_memory_ratio: default_max_memory_ratio(),
            autoscale_interval_secs: default_autoscale_interval_secs(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_pool_size: default_session_pool_size(),
            session_ttl_secs: default_session_ttl_secs(),
            max_error_count: default_session_max_errors(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
            max_transport_retries: default_max_transport_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_fixed_ms: default_backoff_fixed_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crawl: CrawlConfig::default(),
            pool: PoolConfig::default(),
            sessions: SessionConfig::default(),
            http: HttpConfig::default(),
            seeds: Vec::new(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_requests_per_crawl: None,
            max_crawl_time_secs: None,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            request_delay_ms: 0,
            blocked_url_patterns: Vec::new(),
        }
    }
}

impl Config {
    /// Pool options derived from the `[pool]` section
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            min_concurrency: self.pool.min_concurrency,
            max_concurrency: self.pool.max_concurrency,
            initial_concurrency: self.pool.initial_concurrency,
            scale_up_ratio: self.pool.scale_up_ratio,
            scale_down_ratio: self.pool.scale_down_ratio,
            max_cpu_ratio: self.pool.max_cpu_ratio,
            max_memory_ratio: self.pool.max_memory_ratio,
            autoscale_interval: Duration::from_secs(self.pool.autoscale_interval_secs),
        }
    }

    /// Session pool options derived from the `[sessions]` section
    pub fn session_pool_options(&self) -> SessionPoolOptions {
        SessionPoolOptions {
            max_pool_size: self.sessions.max_pool_size,
            session_ttl: Duration::from_secs(self.sessions.session_ttl_secs),
            max_error_count: self.sessions.max_error_count,
            sweep_interval: Duration::from_secs(self.sessions.sweep_interval_secs),
        }
    }

    /// Retry policy derived from the `[crawl]` and `[http]` sections
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_transport_retries: self.http.max_transport_retries,
            backoff_base: Duration::from_millis(self.http.backoff_base_ms),
            backoff_fixed: Duration::from_millis(self.http.backoff_fixed_ms),
            retry_delay: Duration::from_millis(self.crawl.retry_delay_ms),
        }
    }
}
