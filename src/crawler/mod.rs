//! Crawler module: the traversal engine
//!
//! This module contains the core crawling logic, including:
//! - The deduplicating frontier shared by all workers
//! - Cancellable idle, pacing, and cooldown waits
//! - The per-worker fetch/persist/expand loop
//! - Pool lifecycle and the end-to-end crawl entry point

mod coordinator;
mod frontier;
mod pacing;
mod worker;

pub use coordinator::{
    resolve_seed, run_crawl, run_single, CrawlOptions, PoolMonitor, PoolReport, PoolSnapshot,
    WorkerPool, WorkerSnapshot,
};
pub use frontier::{Frontier, FrontierError, FrontierResult, MemoryFrontier, NodeOutcome};
pub use pacing::{wait, Pacer, WaitOutcome};
pub use worker::{CrawlContext, CrawlWorker, WorkerExit, WorkerHandle};

use crate::config::Config;
use crate::RippleError;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the database and pick up or create a run
/// 2. Resolve the configured seeds
/// 3. Run the worker pool until it drains or is interrupted
/// 4. Record how the run ended
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `options` - Run options that do not come from the config file
///
/// # Returns
///
/// * `Ok(PoolReport)` - How the workers ended
/// * `Err(RippleError)` - Crawl failed
pub async fn crawl(config: Config, options: CrawlOptions) -> Result<PoolReport, RippleError> {
    run_crawl(config, options).await
}
