//! Driftnet: an adaptive bounded-concurrency crawl engine
//!
//! This crate implements the scheduling core of a crawler: a deduplicating
//! work frontier, an autoscaled worker pool, a retry/backoff policy and a
//! rotating session pool, wired together by a crawl orchestrator. Fetching,
//! parsing and persistence are pluggable collaborators behind small traits.

pub mod config;
pub mod crawler;
pub mod frontier;
pub mod pool;
pub mod request;
pub mod retry;
pub mod session;
pub mod stats;
pub mod storage;

use thiserror::Error;

/// Main error type for driftnet operations
#[derive(Debug, Error)]
pub enum DriftnetError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("No request handler registered before run()")]
    NoHandler,

    #[error("HTTP error for {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Hook error: {0}")]
    Hook(String),

    #[error("Worker pool is stopped")]
    PoolStopped,

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for driftnet operations
pub type Result<T> = std::result::Result<T, DriftnetError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{
    CrawlContext, Crawler, Executor, FailureHandler, FetchResponse, Hook, HttpExecutor,
    RequestHandler,
};
pub use frontier::Frontier;
pub use pool::{AutoscaledPool, PoolOptions};
pub use request::{WorkItem, WorkState};
pub use retry::{RetryPolicy, SchedulingVerdict};
pub use session::{Session, SessionPool, SessionPoolOptions};
pub use stats::{StatsAggregator, StatsSnapshot};
