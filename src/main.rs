//! depthcrawl main entry point
//!
//! This is the command-line interface for the depthcrawl crawler.

use anyhow::{bail, Context};
use clap::builder::BoolishValueParser;
use clap::Parser;
use depthcrawl::config::{
    find_config_file, load_config_with_hash, parse_duration, require_start_url, Config,
    ConfigOverrides, LogConfig, LogFormat, VisitedBackend,
};
use depthcrawl::crawler::{Engine, EngineSettings, HtmlLinkExtractor, HttpFetcher};
use depthcrawl::output::{load_statistics, print_statistics, print_summary};
use depthcrawl::storage::{
    RecordStore, RedisVisitedSet, SqliteRecordStore, SqliteVisitedSet, VisitedSet,
};
use depthcrawl::CrawlError;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Bound on closing each store at shutdown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// depthcrawl: a breadth-first, restart-safe web crawler
///
/// Crawls outward from a seed URL up to a maximum depth, recording each page
/// with the links found on it. A durable visited set lets repeated runs skip
/// pages that were already crawled.
#[derive(Parser, Debug)]
#[command(name = "depthcrawl")]
#[command(version)]
#[command(about = "A breadth-first, restart-safe web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (default: ./depthcrawl.toml or ./configs/depthcrawl.toml)
    #[arg(short, long, value_name = "FILE", env = "DEPTHCRAWL_CONFIG")]
    config: Option<PathBuf>,

    /// URL to start crawling from
    #[arg(long, value_name = "URL", env = "DEPTHCRAWL_START_URL")]
    start_url: Option<String>,

    /// Only follow links to the start URL's host
    #[arg(long, value_name = "BOOL", env = "DEPTHCRAWL_SAME_HOST",
          num_args = 0..=1, default_missing_value = "true",
          value_parser = BoolishValueParser::new())]
    same_host: Option<bool>,

    /// Deepest level whose links are followed; the start URL is depth 0
    #[arg(long, value_name = "N", env = "DEPTHCRAWL_MAX_DEPTH")]
    max_depth: Option<u32>,

    /// Number of concurrent workers
    #[arg(short, long, value_name = "N", env = "DEPTHCRAWL_WORKER_COUNT")]
    workers: Option<usize>,

    /// Clear the visited set before crawling
    #[arg(long, value_name = "BOOL", env = "DEPTHCRAWL_FORCE_RECRAWL",
          num_args = 0..=1, default_missing_value = "true",
          value_parser = BoolishValueParser::new())]
    force_recrawl: Option<bool>,

    /// Per-request HTTP timeout, e.g. "30s" or "500ms"
    #[arg(long, value_name = "DURATION", env = "DEPTHCRAWL_HTTP_TIMEOUT", value_parser = parse_duration)]
    http_timeout: Option<Duration>,

    /// User-Agent header sent with every request
    #[arg(long, value_name = "UA", env = "DEPTHCRAWL_USER_AGENT")]
    user_agent: Option<String>,

    /// SQLite database holding crawled pages
    #[arg(long, value_name = "PATH", env = "DEPTHCRAWL_DATABASE")]
    database: Option<PathBuf>,

    /// Visited set backend: sqlite or redis
    #[arg(long, value_name = "BACKEND", env = "DEPTHCRAWL_VISITED_BACKEND")]
    visited_backend: Option<VisitedBackend>,

    /// SQLite database holding the visited set
    #[arg(long, value_name = "PATH", env = "DEPTHCRAWL_VISITED_DATABASE")]
    visited_database: Option<PathBuf>,

    /// Redis connection URL for the redis backend
    #[arg(long, value_name = "URL", env = "DEPTHCRAWL_REDIS_URL")]
    redis_url: Option<String>,

    /// Key of the visited set
    #[arg(long, value_name = "KEY", env = "DEPTHCRAWL_SET_KEY")]
    set_key: Option<String>,

    /// Log level: trace, debug, info, warn or error (RUST_LOG takes precedence)
    #[arg(long, value_name = "LEVEL", env = "DEPTHCRAWL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: text or json
    #[arg(long, value_name = "FORMAT", env = "DEPTHCRAWL_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Validate config and show the effective settings without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the record store and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            start_url: self.start_url.clone(),
            same_host: self.same_host,
            max_depth: self.max_depth,
            worker_count: self.workers,
            force_recrawl: self.force_recrawl,
            http_timeout: self.http_timeout,
            user_agent: self.user_agent.clone(),
            store_path: self.database.clone(),
            visited_backend: self.visited_backend,
            visited_path: self.visited_database.clone(),
            redis_url: self.redis_url.clone(),
            set_key: self.set_key.clone(),
            log_level: self.log_level.clone(),
            log_format: self.log_format,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load and validate configuration
    let config_path = find_config_file(cli.config.as_deref());
    let (config, config_hash) = match load_config_with_hash(config_path.as_deref(), &cli.overrides())
    {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = setup_logging(&config.log) {
        eprintln!("Failed to initialize logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    match (&config_path, &config_hash) {
        (Some(path), Some(hash)) => tracing::info!(
            "Configuration loaded from {} (hash: {})",
            path.display(),
            hash
        ),
        _ => tracing::info!("No configuration file found, using defaults and overrides"),
    }

    // Handle different modes
    let result = if cli.dry_run {
        handle_dry_run(&config, config_path.as_deref())
    } else if cli.stats {
        handle_stats(&config).await
    } else {
        handle_crawl(config).await
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Sets up the logging/tracing subscriber
///
/// `RUST_LOG`, when set, replaces the configured level.
fn setup_logging(log: &LogConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!(
            "depthcrawl={},warn",
            log.level.to_ascii_lowercase()
        ))
        .context("Invalid log level")?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);

    let installed = match log.format {
        LogFormat::Text => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| anyhow::anyhow!(e))
}

/// Handles the --dry-run mode: validates config and shows the effective settings
fn handle_dry_run(config: &Config, config_path: Option<&Path>) -> anyhow::Result<()> {
    let start_url = require_start_url(config)?;

    println!("=== depthcrawl Dry Run ===\n");

    match config_path {
        Some(path) => println!("Config file: {}\n", path.display()),
        None => println!("Config file: (none)\n"),
    }

    println!("Crawl:");
    println!("  Start URL: {}", start_url);
    println!("  Same host only: {}", config.same_host);
    println!("  Max depth: {}", config.max_depth);
    println!("  Workers: {}", config.worker_count);
    println!("  Force recrawl: {}", config.force_recrawl);

    println!("\nHTTP:");
    println!("  Timeout: {:?}", config.http.timeout);
    println!("  User agent: {}", config.http.user_agent);

    println!("\nRecord store:");
    println!("  Database: {}", config.store.database_path.display());

    println!("\nVisited set:");
    println!("  Backend: {}", config.visited.backend);
    match config.visited.backend {
        VisitedBackend::Sqlite => {
            println!("  Database: {}", config.visited.database_path.display())
        }
        VisitedBackend::Redis => println!("  Redis: {}", config.visited.redis_url),
    }
    println!("  Set key: {}", config.visited.set_key);

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --stats mode: shows statistics from the record store
async fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let path = &config.store.database_path;
    if !path.exists() {
        bail!("Record store not found: {}", path.display());
    }

    println!("Database: {}\n", path.display());

    let store = SqliteRecordStore::open(path)
        .with_context(|| format!("Failed to open record store {}", path.display()))?;
    let stats = load_statistics(&store)
        .await
        .context("Failed to load statistics")?;
    store.close().await.context("Failed to close record store")?;

    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> anyhow::Result<()> {
    let start_url = require_start_url(&config)?.to_string();

    let cancel = CancellationToken::new();
    let signals = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            wait_for_shutdown().await;
            tracing::info!("Shutdown signal received, stopping crawl");
            cancel.cancel();
        })
    };

    let records = Arc::new(
        SqliteRecordStore::open(&config.store.database_path).with_context(|| {
            format!(
                "Failed to open record store {}",
                config.store.database_path.display()
            )
        })?,
    );
    let visited = open_visited_set(&config).await?;

    let result = crawl(&config, &start_url, &cancel, records.clone(), visited.clone()).await;

    signals.abort();
    close_store("record store", records.close()).await;
    close_store("visited set", visited.close()).await;

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.downcast_ref::<CrawlError>().is_some_and(CrawlError::is_cancelled) => {
            tracing::info!("Crawl cancelled");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Runs one crawl against open stores
async fn crawl(
    config: &Config,
    start_url: &str,
    cancel: &CancellationToken,
    records: Arc<SqliteRecordStore>,
    visited: Arc<dyn VisitedSet>,
) -> anyhow::Result<()> {
    if config.force_recrawl {
        tracing::info!("Force recrawl requested, clearing visited set");
        visited
            .clear()
            .await
            .context("Failed to clear visited set")?;
    }

    let fetcher = HttpFetcher::new(&config.http.user_agent, config.http.timeout)
        .context("Failed to build HTTP client")?;

    let engine = Engine::new(
        EngineSettings::from(config),
        Arc::new(fetcher),
        Arc::new(HtmlLinkExtractor::new()),
        records,
        visited,
    );

    let summary = engine.run(cancel, start_url).await?;
    print_summary(&summary);

    Ok(())
}

/// Opens the configured visited set backend
async fn open_visited_set(config: &Config) -> anyhow::Result<Arc<dyn VisitedSet>> {
    let visited = &config.visited;

    let set: Arc<dyn VisitedSet> = match visited.backend {
        VisitedBackend::Sqlite => Arc::new(
            SqliteVisitedSet::open(&visited.database_path, &visited.set_key).with_context(
                || {
                    format!(
                        "Failed to open visited set {}",
                        visited.database_path.display()
                    )
                },
            )?,
        ),
        VisitedBackend::Redis => Arc::new(
            RedisVisitedSet::connect(&visited.redis_url, &visited.set_key)
                .await
                .with_context(|| format!("Failed to connect to Redis at {}", visited.redis_url))?,
        ),
    };

    tracing::info!(
        "Visited set ready ({} backend, key '{}')",
        visited.backend,
        visited.set_key
    );

    Ok(set)
}

/// Closes a store with its own timeout, logging any failure
async fn close_store<F>(name: &str, close: F)
where
    F: std::future::Future<Output = Result<(), depthcrawl::StorageError>>,
{
    match tokio::time::timeout(CLOSE_TIMEOUT, close).await {
        Ok(Ok(())) => tracing::debug!("Closed {}", name),
        Ok(Err(e)) => tracing::warn!("Failed to close {}: {}", name, e),
        Err(_) => tracing::warn!("Timed out closing {} after {:?}", name, CLOSE_TIMEOUT),
    }
}

/// Resolves on Ctrl-C, or on SIGTERM on Unix
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Unable to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Unable to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
