//! Configuration module
//!
//! Handles loading, parsing, and validating TOML configuration files, plus
//! the conversions from configuration sections into the option structs of
//! the pool, session and retry modules.

mod parser;
mod types;
mod validation;

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use types::{Config, CrawlConfig, HttpConfig, PoolConfig, SessionConfig};
pub use validation::validate;
