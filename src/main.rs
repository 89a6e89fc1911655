//! Driftnet main entry point
//!
//! Command-line interface for running a crawl from a TOML configuration.

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use driftnet::config::load_config_with_hash;
use driftnet::crawler::extract_links;
use driftnet::storage::SqliteDataset;
use driftnet::{Config, CrawlContext, Crawler, HttpExecutor, RequestHandler};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Driftnet: an adaptive bounded-concurrency crawl engine
///
/// Driftnet drains a deduplicated URL frontier through an autoscaled worker
/// pool, rotating sessions and retrying failures, and records fetched pages
/// into a dataset.
#[derive(Parser, Debug)]
#[command(name = "driftnet")]
#[command(version)]
#[command(about = "An adaptive bounded-concurrency crawl engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long)]
    dry_run: bool,

    /// Persist crawled pages to this SQLite dataset file
    #[arg(long, value_name = "PATH")]
    dataset: Option<PathBuf>,

    /// Stay on the hosts of the seed URLs when following links
    #[arg(long)]
    same_host_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded (hash: {})", config_hash);

    if cli.dry_run {
        print_dry_run(&config);
        return Ok(());
    }

    let executor = Arc::new(HttpExecutor::new(&config.http)?);
    let handler = Arc::new(PageHandler {
        allowed_hosts: if cli.same_host_only {
            seed_hosts(&config)
        } else {
            Vec::new()
        },
    });

    let mut crawler = Crawler::new(config, executor);
    crawler.set_request_handler(handler);
    if let Some(path) = &cli.dataset {
        let dataset =
            SqliteDataset::new(path).with_context(|| format!("failed to open {}", path.display()))?;
        crawler.set_dataset(Arc::new(dataset));
    }

    let snapshot = crawler.run().await?;
    println!("{}", snapshot);
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("driftnet=info,warn"),
            1 => EnvFilter::new("driftnet=debug,info"),
            2 => EnvFilter::new("driftnet=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn print_dry_run(config: &Config) {
    println!("=== Driftnet Dry Run ===\n");

    println!("Crawl:");
    match config.crawl.max_requests_per_crawl {
        Some(limit) => println!("  Max requests: {}", limit),
        None => println!("  Max requests: unlimited"),
    }
    match config.crawl.max_crawl_time_secs {
        Some(secs) => println!("  Max crawl time: {}s", secs),
        None => println!("  Max crawl time: unlimited"),
    }
    println!("  Max retries per item: {}", config.crawl.max_retries);
    println!(
        "  Blocked patterns: {}",
        config.crawl.blocked_url_patterns.len()
    );

    println!("Pool:");
    println!(
        "  Concurrency: {} (min {}, max {})",
        config.pool.initial_concurrency, config.pool.min_concurrency, config.pool.max_concurrency
    );

    println!("Seeds:");
    for seed in &config.seeds {
        println!("  {}", seed);
    }
}

fn seed_hosts(config: &Config) -> Vec<String> {
    config
        .seeds
        .iter()
        .filter_map(|seed| url::Url::parse(seed).ok())
        .filter_map(|url| url.host_str().map(str::to_string))
        .collect()
}

/// Default handler: record the page and follow its links
struct PageHandler {
    /// When non-empty, only links on these hosts are followed
    allowed_hosts: Vec<String>,
}

#[async_trait]
impl RequestHandler for PageHandler {
    async fn handle(&self, ctx: &mut CrawlContext) -> driftnet::Result<()> {
        let Some(response) = ctx.response.take() else {
            return Ok(());
        };

        ctx.push_data(json!({
            "url": response.url,
            "status": response.status,
            "content-type": response.content_type,
            "body-length": response.body.len(),
            "fetched-in-ms": response.elapsed.as_millis() as u64,
        }))?;

        let is_html = response
            .content_type
            .as_deref()
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false);
        if is_html {
            let links = extract_links(&response.body, &response.url)
                .into_iter()
                .filter(|link| self.host_allowed(link));
            let accepted = ctx.enqueue_links(links);
            tracing::debug!("Discovered {} new links on {}", accepted, response.url);
        }

        Ok(())
    }
}

impl PageHandler {
    fn host_allowed(&self, link: &str) -> bool {
        if self.allowed_hosts.is_empty() {
            return true;
        }
        url::Url::parse(link)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .map(|host| self.allowed_hosts.iter().any(|allowed| *allowed == host))
            .unwrap_or(false)
    }
}
