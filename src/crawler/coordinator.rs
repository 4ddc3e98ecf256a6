//! Worker pool coordination
//!
//! This module owns the lifecycle of the crawl workers, including:
//! - Resolving raw seeds and seeding the shared frontier
//! - Spawning workers against one frontier, fetcher, and sink
//! - Bounded shutdown with abort of stragglers
//! - Read-only snapshots of frontier size and worker states
//! - The end-to-end `run_crawl` entry point used by the CLI

use crate::config::Config;
use crate::crawler::frontier::{Frontier, FrontierError, FrontierResult};
use crate::crawler::pacing::Pacer;
use crate::crawler::worker::{CrawlContext, CrawlWorker, WorkerExit, WorkerHandle};
use crate::fetcher::{NodeFetcher, NodeRecord, SteamFetcher};
use crate::node::{normalize_node_ref, NodeId, NodeRef};
use crate::state::{WorkerCountersSnapshot, WorkerState};
use crate::storage::{NodeSink, RunStatus, SqliteStorage};
use crate::RippleError;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How often `run_crawl` logs a pool snapshot
const PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

/// Point-in-time view of one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSnapshot {
    pub index: usize,
    pub state: WorkerState,
    pub counters: WorkerCountersSnapshot,
}

/// Point-in-time view of the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSnapshot {
    /// Ids ever admitted to the frontier
    pub seen: usize,

    /// Ids waiting to be fetched
    pub pending: usize,

    /// Ids dequeued by a worker whose outcome is not recorded yet
    pub in_flight: usize,

    pub workers: Vec<WorkerSnapshot>,
}

impl PoolSnapshot {
    /// Number of workers currently in `state`
    pub fn count_in(&self, state: WorkerState) -> usize {
        self.workers.iter().filter(|w| w.state == state).count()
    }

    /// Outcome tallies summed over all workers
    pub fn totals(&self) -> WorkerCountersSnapshot {
        let mut totals = WorkerCountersSnapshot::default();
        for worker in &self.workers {
            totals.merge(&worker.counters);
        }
        totals
    }
}

impl fmt::Display for PoolSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let totals = self.totals();
        write!(
            f,
            "seen={} pending={} in_flight={} processed={} skipped={} malformed={} rate_limited={} | workers: {} fetching, {} backoff, {} idle, {} stopped",
            self.seen,
            self.pending,
            self.in_flight,
            totals.processed,
            totals.skipped,
            totals.malformed,
            totals.rate_limited,
            self.count_in(WorkerState::Fetching),
            self.count_in(WorkerState::Backoff),
            self.count_in(WorkerState::Idle),
            self.count_in(WorkerState::Stopped),
        )
    }
}

/// Read-only view of a pool that can be moved into other tasks
#[derive(Clone)]
pub struct PoolMonitor {
    frontier: Arc<dyn Frontier>,
    handles: Vec<WorkerHandle>,
}

impl PoolMonitor {
    /// Reads frontier counts and worker states without touching the workers
    pub fn snapshot(&self) -> FrontierResult<PoolSnapshot> {
        Ok(PoolSnapshot {
            seen: self.frontier.seen_count()?,
            pending: self.frontier.size()?,
            in_flight: self.frontier.in_flight()?,
            workers: self
                .handles
                .iter()
                .map(|h| WorkerSnapshot {
                    index: h.index(),
                    state: h.state(),
                    counters: h.counters(),
                })
                .collect(),
        })
    }
}

/// Summary of how the workers ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReport {
    /// Workers that exited after the frontier stayed empty
    pub drained: usize,

    /// Workers that exited on a stop request
    pub stopped: usize,

    /// Workers that missed the shutdown deadline and were aborted
    pub aborted: usize,

    /// Workers whose task panicked
    pub panicked: usize,

    pub totals: WorkerCountersSnapshot,
}

/// Owns a set of crawl workers sharing one frontier
pub struct WorkerPool {
    ctx: Arc<CrawlContext>,
    token: CancellationToken,
    handles: Vec<WorkerHandle>,
    /// Spawned tasks not yet joined, each with its index into `handles`
    tasks: Vec<(usize, JoinHandle<Result<WorkerExit, FrontierError>>)>,
    shutdown_timeout: Duration,
    report: PoolReport,
    fatal: Option<FrontierError>,
}

impl WorkerPool {
    /// Creates an idle pool
    ///
    /// # Arguments
    ///
    /// * `ctx` - Frontier, fetcher, sink, and wait settings shared by all workers
    /// * `shutdown_timeout` - Upper bound on joining workers in [`WorkerPool::stop_all`]
    pub fn new(ctx: CrawlContext, shutdown_timeout: Duration) -> Self {
        Self {
            ctx: Arc::new(ctx),
            token: CancellationToken::new(),
            handles: Vec::new(),
            tasks: Vec::new(),
            shutdown_timeout,
            report: PoolReport::default(),
            fatal: None,
        }
    }

    /// Builds a pool from configuration and explicit collaborators
    pub fn from_config(
        config: &Config,
        frontier: Arc<dyn Frontier>,
        fetcher: Arc<dyn NodeFetcher>,
        sink: Arc<dyn NodeSink>,
    ) -> Self {
        let ctx = CrawlContext {
            frontier,
            fetcher,
            sink,
            pacer: Pacer::from_config(&config.crawler),
            transient_retries: config.crawler.transient_retries,
            empty_queue_timeout: config.crawler.empty_queue_timeout(),
        };
        Self::new(ctx, config.crawler.shutdown_timeout())
    }

    /// Resolves seeds, seeds the frontier, then spawns the workers
    ///
    /// # Arguments
    ///
    /// * `seeds` - Raw identifiers: ids, profile locators, or aliases
    /// * `worker_count` - Number of workers to spawn
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of seeds newly admitted to the frontier
    /// * `Err(RippleError)` - A seed could not be resolved, the frontier
    ///   failed, or the pool was already started
    pub async fn start(&mut self, seeds: &[String], worker_count: usize) -> Result<usize, RippleError> {
        if !self.handles.is_empty() {
            return Err(RippleError::Pool("Pool already started".to_string()));
        }
        if worker_count == 0 {
            return Err(RippleError::Pool(
                "worker_count must be at least 1".to_string(),
            ));
        }

        let ids = self.resolve_seeds(seeds).await?;
        let accepted = self.ctx.frontier.seed(&ids)?;
        tracing::info!(
            "Seeded frontier: {} of {} seeds new, {} pending, {} seen",
            accepted,
            ids.len(),
            self.ctx.frontier.size()?,
            self.ctx.frontier.seen_count()?
        );

        for index in 0..worker_count {
            let (worker, handle) = CrawlWorker::new(index, Arc::clone(&self.ctx), &self.token);
            self.tasks.push((index, tokio::spawn(worker.run())));
            self.handles.push(handle);
        }
        tracing::info!("Started {} workers", worker_count);

        Ok(accepted)
    }

    /// Normalizes raw seeds to canonical ids, resolving aliases remotely
    pub async fn resolve_seeds(&self, seeds: &[String]) -> Result<Vec<NodeId>, RippleError> {
        let mut ids = Vec::with_capacity(seeds.len());
        for raw in seeds {
            ids.push(
                resolve_seed(self.ctx.fetcher.as_ref(), raw, self.ctx.transient_retries).await?,
            );
        }
        Ok(ids)
    }

    /// Handles of the spawned workers, in index order
    pub fn handles(&self) -> &[WorkerHandle] {
        &self.handles
    }

    /// Token that stops every worker when cancelled
    ///
    /// Cancelling it does not join the workers; follow with
    /// [`WorkerPool::stop_all`] or [`WorkerPool::wait`].
    pub fn stop_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn monitor(&self) -> PoolMonitor {
        PoolMonitor {
            frontier: Arc::clone(&self.ctx.frontier),
            handles: self.handles.clone(),
        }
    }

    pub fn snapshot(&self) -> FrontierResult<PoolSnapshot> {
        self.monitor().snapshot()
    }

    /// Returns true once every spawned worker task has ended
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(|(_, t)| t.is_finished())
    }

    /// Stops every worker and joins them
    ///
    /// Workers that have not exited within the shutdown timeout are aborted
    /// and counted in [`PoolReport::aborted`].
    ///
    /// # Returns
    ///
    /// * `Ok(PoolReport)` - All workers ended
    /// * `Err(RippleError::Frontier)` - A worker hit a frontier failure
    pub async fn stop_all(&mut self) -> Result<PoolReport, RippleError> {
        self.token.cancel();
        let deadline = Instant::now() + self.shutdown_timeout;
        self.join(Some(deadline)).await
    }

    /// Joins workers that end on their own (drain timeout or frontier failure)
    ///
    /// Safe to cancel: workers not yet joined stay owned by the pool.
    pub async fn wait(&mut self) -> Result<PoolReport, RippleError> {
        self.join(None).await
    }

    async fn join(&mut self, deadline: Option<Instant>) -> Result<PoolReport, RippleError> {
        while let Some((index, task)) = self.tasks.first_mut() {
            let index = *index;
            let joined = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, &mut *task).await.ok(),
                None => Some((&mut *task).await),
            };

            match joined {
                Some(Ok(Ok(WorkerExit::Drained))) => self.report.drained += 1,
                Some(Ok(Ok(WorkerExit::Stopped))) => self.report.stopped += 1,
                Some(Ok(Err(e))) => {
                    if self.fatal.is_none() {
                        self.fatal = Some(e);
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(worker = index, "Worker task panicked: {}", e);
                    self.handles[index].mark_stopped();
                    self.report.panicked += 1;
                }
                None => {
                    task.abort();
                    tracing::warn!(worker = index, "Worker missed the shutdown deadline and was aborted");
                    self.handles[index].mark_stopped();
                    self.report.aborted += 1;
                }
            }
            self.tasks.remove(0);
        }

        if let Some(e) = self.fatal.take() {
            return Err(e.into());
        }

        let mut report = self.report.clone();
        for handle in &self.handles {
            report.totals.merge(&handle.counters());
        }
        Ok(report)
    }
}

/// Normalizes one raw seed, resolving an alias through `fetcher`
///
/// Transient resolution failures are retried up to `transient_retries`
/// times; any other failure is a [`RippleError::SeedResolution`].
pub async fn resolve_seed(
    fetcher: &dyn NodeFetcher,
    raw: &str,
    transient_retries: u32,
) -> Result<NodeId, RippleError> {
    let alias = match normalize_node_ref(raw)? {
        NodeRef::Id(id) => return Ok(id),
        NodeRef::Alias(alias) => alias,
    };

    let mut attempt = 0;
    loop {
        match fetcher.resolve_alias(&alias).await {
            Ok(id) => {
                tracing::debug!("Resolved alias {} to {}", alias, id);
                return Ok(id);
            }
            Err(e) if e.is_retryable() && attempt < transient_retries => {
                attempt += 1;
            }
            Err(e) => {
                return Err(RippleError::SeedResolution {
                    input: raw.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Options for a crawl run that do not live in the config file
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    /// Discard the persisted frontier and start a new run
    pub fresh: bool,

    /// Hash of the config file, recorded with the run
    pub config_hash: String,
}

/// Runs a complete crawl against the configured database
///
/// This function orchestrates the entire crawl process:
///
/// 1. Open storage; resume an interrupted run or start a new one
/// 2. Build the HTTP fetcher
/// 3. Resolve seeds and start the worker pool
/// 4. Log a pool snapshot periodically
/// 5. On Ctrl-C stop all workers; otherwise wait for them to drain
/// 6. Record the run as completed, interrupted, or failed
///
/// # Example
///
/// ```no_run
/// use steam_ripple::config::load_config_with_hash;
/// use steam_ripple::crawler::{run_crawl, CrawlOptions};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, config_hash) = load_config_with_hash(Path::new("config.toml"))?;
/// run_crawl(config, CrawlOptions { fresh: false, config_hash }).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config, options: CrawlOptions) -> Result<PoolReport, RippleError> {
    let storage = Arc::new(SqliteStorage::new(Path::new(&config.output.database_path))?);

    let run_id = if options.fresh {
        storage.clear_frontier()?;
        let id = storage.create_run(&options.config_hash)?;
        tracing::info!("Starting fresh run {}", id);
        id
    } else {
        match storage.get_latest_run()? {
            Some(run) if run.status == RunStatus::Running => {
                if run.config_hash != options.config_hash {
                    tracing::warn!("Configuration changed since run {} started", run.id);
                }
                tracing::info!("Resuming interrupted run {}", run.id);
                run.id
            }
            _ => {
                let id = storage.create_run(&options.config_hash)?;
                tracing::info!("Starting new run {}", id);
                id
            }
        }
    };

    if !options.fresh {
        let requeued = storage.requeue_in_flight()?;
        if requeued > 0 {
            tracing::info!("Requeued {} nodes left in flight by an earlier run", requeued);
        }
    }

    let fetcher = Arc::new(SteamFetcher::from_config(&config)?);
    let frontier: Arc<dyn Frontier> = storage.clone();
    let sink: Arc<dyn NodeSink> = storage.clone();
    let mut pool = WorkerPool::from_config(&config, frontier, fetcher, sink);

    if let Err(e) = pool
        .start(&config.seeds, config.crawler.workers as usize)
        .await
    {
        storage.update_run_status(run_id, RunStatus::Failed)?;
        return Err(e);
    }

    let stop_token = pool.stop_token();
    let interrupted = Arc::new(AtomicBool::new(false));

    let interrupt_task = {
        let stop_token = stop_token.clone();
        let interrupted = Arc::clone(&interrupted);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, stopping workers");
                interrupted.store(true, Ordering::SeqCst);
                stop_token.cancel();
            }
        })
    };

    let progress_task = {
        let monitor = pool.monitor();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match monitor.snapshot() {
                    Ok(snapshot) => tracing::info!("Progress: {}", snapshot),
                    Err(e) => tracing::warn!("Could not read pool snapshot: {}", e),
                }
            }
        })
    };

    let finished = tokio::select! {
        result = pool.wait() => Some(result),
        _ = stop_token.cancelled() => None,
    };
    let result = match finished {
        Some(result) => result,
        None => pool.stop_all().await,
    };

    interrupt_task.abort();
    progress_task.abort();

    if let Ok(snapshot) = pool.snapshot() {
        tracing::info!("Final: {}", snapshot);
    }

    let status = match &result {
        Err(_) => RunStatus::Failed,
        Ok(_) if interrupted.load(Ordering::SeqCst) => RunStatus::Interrupted,
        Ok(_) => RunStatus::Completed,
    };
    storage.update_run_status(run_id, status)?;
    tracing::info!("Run {} finished: {}", run_id, status.to_db_string());

    result
}

/// Scrapes one profile without touching the frontier
///
/// The seed is resolved, fetched exactly once, and upserted; friends are
/// recorded as edges but not crawled.
///
/// # Returns
///
/// * `Ok(NodeRecord)` - The stored record
/// * `Err(RippleError::SeedResolution)` - The seed could not be resolved
/// * `Err(RippleError::Fetch)` - The profile fetch failed
pub async fn run_single(config: &Config, seed: &str) -> Result<NodeRecord, RippleError> {
    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let fetcher = SteamFetcher::from_config(config)?;

    let id = resolve_seed(&fetcher, seed, config.crawler.transient_retries).await?;
    tracing::info!("Scraping single profile {}", id);

    let record = fetcher.fetch(id).await?;
    storage.upsert(record.clone())?;
    tracing::info!(
        node = %id,
        neighbors = record.neighbors.len(),
        "Stored single profile"
    );

    Ok(record)
}
