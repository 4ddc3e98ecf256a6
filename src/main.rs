//! Steam-Ripple main entry point
//!
//! This is the command-line interface for the Steam-Ripple profile graph crawler.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use steam_ripple::config::{load_config_with_hash, validate, Config};
use steam_ripple::crawler::{crawl, run_single, CrawlOptions};
use steam_ripple::node::normalize_node_ref;
use tracing_subscriber::EnvFilter;

/// Steam-Ripple: a paced crawler for the Steam Community friend graph
///
/// Steam-Ripple starts from a set of seed profiles, fetches each profile and
/// its friend list, and expands outward breadth-first while pacing requests
/// and backing off when the site throttles.
#[derive(Parser, Debug)]
#[command(name = "steam-ripple")]
#[command(version)]
#[command(about = "A paced Steam Community friend-graph crawler", long_about = None)]
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

    /// Start a fresh crawl, discarding the persisted frontier
    #[arg(long)]
    fresh: bool,

    /// Additional seed (id, profile URL, or vanity name); may be repeated
    #[arg(long = "seed", value_name = "SEED")]
    seeds: Vec<String>,

    /// Override the configured number of workers
    #[arg(long, value_name = "N")]
    workers: Option<u32>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Scrape one profile, store it, print it, and exit without crawling
    #[arg(long, value_name = "SEED", conflicts_with_all = ["dry_run", "stats", "fresh"])]
    single: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    apply_overrides(&mut config, &cli)?;

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if let Some(seed) = cli.single.as_deref() {
        handle_single(&config, seed).await
    } else {
        handle_crawl(config, cli.fresh, config_hash).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("steam_ripple=info,warn"),
            1 => EnvFilter::new("steam_ripple=debug,info"),
            2 => EnvFilter::new("steam_ripple=trace,debug"),
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

/// Folds command-line seeds and worker count into the loaded config
fn apply_overrides(config: &mut Config, cli: &Cli) -> anyhow::Result<()> {
    if cli.seeds.is_empty() && cli.workers.is_none() {
        return Ok(());
    }

    config.seeds.extend(cli.seeds.iter().cloned());
    if let Some(workers) = cli.workers {
        config.crawler.workers = workers;
    }

    validate(config).context("Invalid command-line override")?;
    Ok(())
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Steam-Ripple Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Idle wait: {}ms", config.crawler.idle_wait_ms);
    println!(
        "  Pacing: {}-{}ms",
        config.crawler.pacing_min_ms, config.crawler.pacing_max_ms
    );
    println!("  Cooldown: {}s", config.crawler.cooldown_secs);
    println!("  Transient retries: {}", config.crawler.transient_retries);
    println!(
        "  Max friends per profile: {}",
        config.crawler.max_friends_per_profile
    );
    match config.crawler.empty_queue_timeout_ms {
        Some(ms) => println!("  Empty queue timeout: {}ms", ms),
        None => println!("  Empty queue timeout: none (run until interrupted)"),
    }

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nSource:");
    println!("  Base URL: {}", config.source.base_url);
    println!("  Request timeout: {}s", config.source.request_timeout_secs);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\nSeeds ({}):", config.seeds.len());
    for seed in &config.seeds {
        match normalize_node_ref(seed) {
            Ok(node) => println!("  - {} -> {}", seed, node),
            Err(e) => println!("  - {} (invalid: {})", seed, e),
        }
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start crawling with {} seeds on {} workers",
        config.seeds.len(),
        config.crawler.workers
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use steam_ripple::output::{load_statistics, print_statistics};
    use steam_ripple::storage::SqliteStorage;

    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("Failed to open database")?;

    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --single mode: one fetch, one upsert, no frontier
async fn handle_single(config: &Config, seed: &str) -> anyhow::Result<()> {
    let record = run_single(config, seed)
        .await
        .with_context(|| format!("Failed to scrape {}", seed))?;

    println!("Profile: {}", record.id);
    println!("  URL: {}", record.profile_url);
    println!("  Level: {}", record.level);
    if let Some(avatar) = &record.avatar_url {
        println!("  Avatar: {}", avatar);
    }
    match &record.ban {
        Some(ban) => match ban.date {
            Some(date) => println!("  Ban: {} ({})", ban.kind, date),
            None => println!("  Ban: {}", ban.kind),
        },
        None => println!("  Ban: none"),
    }
    println!("  Friends ({}):", record.neighbors.len());
    for friend in &record.neighbors {
        println!("    - {}", friend);
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, fresh: bool, config_hash: String) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh crawl (discarding persisted frontier)");
    } else {
        tracing::info!("Starting crawl (will resume if interrupted run exists)");
    }

    tracing::info!(
        "Seeds: {}, workers: {}",
        config.seeds.len(),
        config.crawler.workers
    );

    match crawl(config, CrawlOptions { fresh, config_hash }).await {
        Ok(report) => {
            tracing::info!(
                "Crawl finished: {} processed, {} skipped, {} malformed, {} rate limited ({} drained, {} stopped, {} aborted)",
                report.totals.processed,
                report.totals.skipped,
                report.totals.malformed,
                report.totals.rate_limited,
                report.drained,
                report.stopped,
                report.aborted
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
