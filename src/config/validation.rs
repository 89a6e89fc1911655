use crate::config::types::{Config, CrawlConfig, HttpConfig, PoolConfig, SessionConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawl_config(&config.crawl)?;
    validate_pool_config(&config.pool)?;
    validate_session_config(&config.sessions)?;
    validate_http_config(&config.http)?;
    validate_seeds(&config.seeds)?;
    Ok(())
}

fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.max_requests_per_crawl == Some(0) {
        return Err(ConfigError::Validation(
            "max_requests_per_crawl must be >= 1 when set".to_string(),
        ));
    }

    if config.max_crawl_time_secs == Some(0) {
        return Err(ConfigError::Validation(
            "max_crawl_time_secs must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_pool_config(config: &PoolConfig) -> Result<(), ConfigError> {
    if config.min_concurrency < 1 {
        return Err(ConfigError::Validation(format!(
            "min_concurrency must be >= 1, got {}",
            config.min_concurrency
        )));
    }

    if config.max_concurrency < config.min_concurrency {
        return Err(ConfigError::Validation(format!(
            "max_concurrency ({}) must be >= min_concurrency ({})",
            config.max_concurrency, config.min_concurrency
        )));
    }

    if config.initial_concurrency < config.min_concurrency
        || config.initial_concurrency > config.max_concurrency
    {
        return Err(ConfigError::Validation(format!(
            "initial_concurrency ({}) must be between min_concurrency ({}) and max_concurrency ({})",
            config.initial_concurrency, config.min_concurrency, config.max_concurrency
        )));
    }

    for (name, ratio) in [
        ("scale_up_ratio", config.scale_up_ratio),
        ("scale_down_ratio", config.scale_down_ratio),
        ("max_cpu_ratio", config.max_cpu_ratio),
        ("max_memory_ratio", config.max_memory_ratio),
    ] {
        if !(0.0..=1.0).contains(&ratio) || ratio == 0.0 {
            return Err(ConfigError::Validation(format!(
                "{} must be in (0.0, 1.0], got {}",
                name, ratio
            )));
        }
    }

    if config.autoscale_interval_secs < 1 {
        return Err(ConfigError::Validation(
            "autoscale_interval_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    if config.max_pool_size < 1 {
        return Err(ConfigError::Validation(
            "max_pool_size must be >= 1".to_string(),
        ));
    }

    if config.max_error_count < 1 {
        return Err(ConfigError::Validation(
            "max_error_count must be >= 1".to_string(),
        ));
    }

    if config.sweep_interval_secs < 1 {
        return Err(ConfigError::Validation(
            "sweep_interval_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.user_agent.is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_seeds(seeds: &[String]) -> Result<(), ConfigError> {
    for seed in seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::Validation(format!("invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "seed URL '{}' must use http or https",
                seed
            )));
        }
    }

    Ok(())
}
