//! Statistics generation from crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::crawler::{Frontier, NodeOutcome};
use crate::fetcher::BanKind;
use crate::storage::{RunRecord, SqliteStorage};
use crate::RippleError;
use std::collections::BTreeMap;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Number of stored profiles
    pub total_profiles: u64,

    /// Number of stored profiles with any ban
    pub banned_profiles: u64,

    /// Banned profiles per ban kind
    pub ban_breakdown: BTreeMap<BanKind, u64>,

    /// Number of recorded friend edges
    pub total_friendships: u64,

    /// Mean profile level, if any profile is stored
    pub average_level: Option<f64>,

    /// Ids ever admitted to the frontier
    pub frontier_seen: usize,

    /// Ids still waiting in the frontier
    pub frontier_pending: usize,

    /// Ids dequeued by a run that ended before finishing them
    pub frontier_in_flight: usize,

    /// Finished ids per outcome
    pub outcome_breakdown: BTreeMap<NodeOutcome, u64>,

    /// Most recent run, if any
    pub latest_run: Option<RunRecord>,
}

impl CrawlStatistics {
    /// Share of stored profiles that carry a ban, as a percentage
    pub fn banned_percentage(&self) -> f64 {
        if self.total_profiles == 0 {
            return 0.0;
        }
        (self.banned_profiles as f64 / self.total_profiles as f64) * 100.0
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The database to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(RippleError)` - Failed to query statistics
pub fn load_statistics(storage: &SqliteStorage) -> Result<CrawlStatistics, RippleError> {
    Ok(CrawlStatistics {
        total_profiles: storage.count_profiles()?,
        banned_profiles: storage.count_banned_profiles()?,
        ban_breakdown: storage.ban_breakdown()?,
        total_friendships: storage.count_friendships()?,
        average_level: storage.average_level()?,
        frontier_seen: storage.seen_count()?,
        frontier_pending: storage.size()?,
        frontier_in_flight: storage.in_flight()?,
        outcome_breakdown: storage.outcome_breakdown()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    if let Some(run) = &stats.latest_run {
        println!("Latest run: #{} ({})", run.id, run.status.to_db_string());
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        println!();
    }

    println!("Profiles:");
    println!("  Total profiles scraped: {}", stats.total_profiles);
    println!("  Friend edges recorded: {}", stats.total_friendships);
    match stats.average_level {
        Some(level) => println!("  Average level: {:.1}", level),
        None => println!("  Average level: n/a"),
    }
    println!();

    println!(
        "Bans: {} ({:.1}%)",
        stats.banned_profiles,
        stats.banned_percentage()
    );
    for (kind, count) in &stats.ban_breakdown {
        println!("  {}: {}", kind, count);
    }
    println!();

    println!("Frontier:");
    println!("  Seen: {}", stats.frontier_seen);
    println!("  Pending: {}", stats.frontier_pending);
    println!("  In flight: {}", stats.frontier_in_flight);
    for (outcome, count) in &stats.outcome_breakdown {
        println!("  {}: {}", outcome, count);
    }
}
