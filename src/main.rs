//! Sumi-Archive main entry point
//!
//! This is the command-line interface for the Sumi-Archive web archiver.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sumi_archive::config::{load_config_with_hash, Config};
use sumi_archive::output::{
    activity_series, load_statistics, render_activity, render_summary, stats::DEFAULT_BUCKET,
    write_summary,
};
use sumi_archive::storage::{clear_archive, PageStore, RawStore, SqliteStorage};
use sumi_archive::{CrawlSummary, Crawler};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Sumi-Archive: a polite web archiver
///
/// Sumi-Archive crawls outward from a set of seed URLs, spacing requests to
/// each host, retrying transient failures, and storing every page in a
/// full-text searchable SQLite archive.
#[derive(Parser, Debug)]
#[command(name = "sumi-archive")]
#[command(version = "1.0.0")]
#[command(about = "A polite web archiver", long_about = None)]
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

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "recent", "search", "clear"])]
    dry_run: bool,

    /// Print and write the summary report, then exit
    #[arg(long, conflicts_with_all = ["dry_run", "recent", "search", "clear"])]
    stats: bool,

    /// Show the N most recently fetched pages and exit
    #[arg(long, value_name = "N", conflicts_with_all = ["dry_run", "stats", "search", "clear"])]
    recent: Option<usize>,

    /// Full-text search the archive and exit
    #[arg(long, value_name = "QUERY", conflicts_with_all = ["dry_run", "stats", "recent", "clear"])]
    search: Option<String>,

    /// Delete the database and raw bodies, then exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "recent", "search"])]
    clear: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if let Some(limit) = cli.recent {
        handle_recent(&config, limit)?;
    } else if let Some(query) = &cli.search {
        handle_search(&config, query)?;
    } else if cli.clear {
        handle_clear(&config)?;
    } else {
        handle_crawl(config, config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_archive=info,warn"),
            1 => EnvFilter::new("sumi_archive=debug,info"),
            2 => EnvFilter::new("sumi_archive=trace,debug"),
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

fn open_storage(config: &Config) -> Result<SqliteStorage> {
    let path = Path::new(&config.output.database_path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    SqliteStorage::new(path).with_context(|| format!("Failed to open database {}", path.display()))
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) {
    let crawler = &config.crawler;
    println!("=== Sumi-Archive Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max concurrency: {}", crawler.max_concurrency);
    println!("  Max depth: {}", crawler.max_depth);
    println!("  Per-host delay: {}ms", crawler.per_host_delay);
    println!("  Retry limit: {}", crawler.retry_limit);
    println!("  Request timeout: {}ms", crawler.request_timeout);
    println!("  Max body size: {} bytes", crawler.max_body_size);
    println!(
        "  Backoff: {}ms base, {}ms cap",
        crawler.backoff_base, crawler.max_backoff
    );
    println!("  Grace period: {}ms", crawler.grace_period);
    match crawler.max_pages {
        Some(limit) => println!("  Max pages: {}", limit),
        None => println!("  Max pages: unlimited"),
    }

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Raw HTML: {}", config.output.raw_html_dir);
    println!("  Summary: {}", config.output.summary_path);

    println!("\nSeeds ({}):", crawler.seeds.len());
    for seed in &crawler.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start crawling with {} seed URLs",
        crawler.seeds.len()
    );
}

/// Handles the --stats mode: prints and writes the summary report
fn handle_stats(config: &Config) -> Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(config)?;
    let stats = load_statistics(&storage).context("Failed to load statistics")?;
    print!("{}", render_summary(&stats));

    let series = activity_series(&storage, DEFAULT_BUCKET).context("Failed to load activity")?;
    if !series.is_empty() {
        println!("\nActivity (cumulative, 5 s buckets):");
        print!("{}", render_activity(&series));
    }

    let summary_path = Path::new(&config.output.summary_path);
    write_summary(&stats, summary_path)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;
    println!("\n✓ Summary written to: {}", summary_path.display());

    Ok(())
}

/// Handles the --recent mode: prints the newest pages as JSON
fn handle_recent(config: &Config, limit: usize) -> Result<()> {
    let storage = open_storage(config)?;
    for page in storage.recent_pages(limit)? {
        println!("{}", serde_json::to_string_pretty(&page)?);
    }
    Ok(())
}

/// Handles the --search mode
fn handle_search(config: &Config, query: &str) -> Result<()> {
    let storage = open_storage(config)?;
    let hits = storage
        .search(query, 20)
        .with_context(|| format!("Search failed for '{}'", query))?;

    if hits.is_empty() {
        println!("No results for '{}'", query);
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. {} ({:.3})", i + 1, hit.url, hit.rank);
        if !hit.title.is_empty() {
            println!("   {}", hit.title);
        }
        println!("   {}", hit.snippet);
    }
    Ok(())
}

/// Handles the --clear mode
fn handle_clear(config: &Config) -> Result<()> {
    clear_archive(
        Path::new(&config.output.database_path),
        Path::new(&config.output.raw_html_dir),
    )
    .context("Failed to clear archive")?;
    println!("✓ Cleared the archive");
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String) -> Result<()> {
    let storage = open_storage(&config)?;
    let raw_store = RawStore::new(&config.output.raw_html_dir)
        .with_context(|| format!("Failed to create {}", config.output.raw_html_dir))?;

    tracing::info!("Total seed URLs: {}", config.crawler.seeds.len());

    let crawler = Crawler::new(
        config.crawler.clone(),
        config.user_agent.clone(),
        Arc::new(storage),
    )
    .with_raw_store(Arc::new(raw_store))
    .with_config_hash(config_hash);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, finishing in-flight requests");
                cancel.cancel();
            }
        });
    }

    let summary = crawler
        .start_with_cancellation(&config.crawler.seeds, cancel)
        .await
        .context("Crawl failed")?;
    print_summary(&summary);

    Ok(())
}

fn print_summary(summary: &CrawlSummary) {
    println!("=== Crawl Run {} ===", summary.run_id);
    println!("  Pages fetched: {}", summary.pages_fetched);
    println!("  Failures: {}", summary.failures);
    println!("  Elapsed: {:.2}s", summary.elapsed.as_secs_f64());
    println!("  Cancelled: {}", summary.cancelled);
    if summary.pending_dropped > 0 {
        println!("  Pending URLs dropped: {}", summary.pending_dropped);
    }
    if !summary.in_flight_at_shutdown.is_empty() {
        println!("  In flight at shutdown:");
        for url in &summary.in_flight_at_shutdown {
            println!("    - {}", url);
        }
    }
}
