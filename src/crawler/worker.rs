//! Crawl worker loop
//!
//! A worker repeatedly takes one id off the shared frontier, fetches it,
//! hands the record to the sink, and admits the neighbors back into the
//! frontier. Fetch and persist failures never end the loop; only a stop
//! request, a drained queue, or a frontier failure do.

use crate::crawler::frontier::{Frontier, FrontierError, NodeOutcome};
use crate::crawler::pacing::{Pacer, WaitOutcome};
use crate::fetcher::{FetchError, NodeFetcher, NodeRecord};
use crate::node::NodeId;
use crate::state::{WorkerCounters, WorkerCountersSnapshot, WorkerState, WorkerStateCell};
use crate::storage::NodeSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Collaborators and settings shared by every worker in a pool
pub struct CrawlContext {
    pub frontier: Arc<dyn Frontier>,
    pub fetcher: Arc<dyn NodeFetcher>,
    pub sink: Arc<dyn NodeSink>,
    pub pacer: Pacer,

    /// Immediate retries after a transient fetch failure
    pub transient_retries: u32,

    /// Exit once the frontier has been empty this long
    pub empty_queue_timeout: Option<Duration>,
}

/// Why a worker loop ended on its own terms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// A stop was requested
    Stopped,

    /// The frontier stayed empty past the configured timeout
    Drained,
}

/// Control and observation side of a running worker
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    index: usize,
    state: Arc<WorkerStateCell>,
    counters: Arc<WorkerCounters>,
    token: CancellationToken,
}

impl WorkerHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Current state of the worker
    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// Requests the worker to stop
    ///
    /// Returns immediately. A wait in progress ends at once; an in-flight
    /// fetch is allowed to complete first.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn counters(&self) -> WorkerCountersSnapshot {
        self.counters.snapshot()
    }

    /// Records that the worker's task ended without running its own exit path
    pub(crate) fn mark_stopped(&self) {
        self.state.set(WorkerState::Stopped);
    }
}

/// One crawl worker
pub struct CrawlWorker {
    index: usize,
    ctx: Arc<CrawlContext>,
    state: Arc<WorkerStateCell>,
    counters: Arc<WorkerCounters>,
    token: CancellationToken,
    pool_token: CancellationToken,
}

impl CrawlWorker {
    /// Creates a worker and its handle
    ///
    /// The worker listens on a child of `pool_token`, so cancelling the pool
    /// stops every worker while [`WorkerHandle::stop`] stops just this one.
    pub fn new(
        index: usize,
        ctx: Arc<CrawlContext>,
        pool_token: &CancellationToken,
    ) -> (Self, WorkerHandle) {
        let state = Arc::new(WorkerStateCell::new(WorkerState::Idle));
        let counters = Arc::new(WorkerCounters::default());
        let token = pool_token.child_token();

        let handle = WorkerHandle {
            index,
            state: Arc::clone(&state),
            counters: Arc::clone(&counters),
            token: token.clone(),
        };

        let worker = Self {
            index,
            ctx,
            state,
            counters,
            token,
            pool_token: pool_token.clone(),
        };

        (worker, handle)
    }

    /// Runs the worker loop to completion
    ///
    /// # Returns
    ///
    /// * `Ok(WorkerExit)` - The loop ended normally
    /// * `Err(FrontierError)` - The frontier failed; the whole pool has been
    ///   told to stop
    pub async fn run(self) -> Result<WorkerExit, FrontierError> {
        tracing::info!(worker = self.index, "Worker started");

        let result = self.run_loop().await;
        self.state.set(WorkerState::Stopped);

        match &result {
            Ok(exit) => {
                let c = self.counters.snapshot();
                tracing::info!(
                    worker = self.index,
                    ?exit,
                    processed = c.processed,
                    skipped = c.skipped,
                    rate_limited = c.rate_limited,
                    "Worker stopped"
                );
            }
            Err(e) => {
                tracing::error!(worker = self.index, error = %e, "Frontier failure, stopping pool");
                self.pool_token.cancel();
            }
        }

        result
    }

    async fn run_loop(&self) -> Result<WorkerExit, FrontierError> {
        let mut empty_since: Option<Instant> = None;

        loop {
            if self.token.is_cancelled() {
                return Ok(WorkerExit::Stopped);
            }
            self.state.set(WorkerState::Idle);

            let Some(id) = self.ctx.frontier.try_dequeue()? else {
                let since = *empty_since.get_or_insert_with(Instant::now);
                let remaining = match self.ctx.empty_queue_timeout {
                    Some(limit) => {
                        let remaining = limit.saturating_sub(since.elapsed());
                        if remaining.is_zero() {
                            return Ok(WorkerExit::Drained);
                        }
                        Some(remaining)
                    }
                    None => None,
                };

                if self.ctx.pacer.idle(&self.token, remaining).await.is_stopped() {
                    return Ok(WorkerExit::Stopped);
                }
                continue;
            };
            empty_since = None;

            if self.process(id).await?.is_stopped() {
                return Ok(WorkerExit::Stopped);
            }
        }
    }

    /// Handles one dequeued id, including any wait that follows it
    ///
    /// The outcome is recorded on the frontier before any wait, so a stop
    /// during pacing or cooldown never leaves the id in flight.
    async fn process(&self, id: NodeId) -> Result<WaitOutcome, FrontierError> {
        self.state.set(WorkerState::Fetching);
        tracing::debug!(worker = self.index, node = %id, "Fetching node");

        let error = match self.fetch_with_retries(id).await {
            Ok(record) => {
                self.state.set(WorkerState::Idle);
                self.handle_record(record)?;
                self.ctx.frontier.finish(id, NodeOutcome::Processed)?;
                return Ok(self.ctx.pacer.pace(&self.token).await);
            }
            Err(e) => e,
        };

        self.ctx.frontier.finish(id, NodeOutcome::from(&error))?;

        match error {
            FetchError::RateLimited => {
                WorkerCounters::bump(&self.counters.rate_limited);
                tracing::warn!(
                    worker = self.index,
                    node = %id,
                    cooldown = ?self.ctx.pacer.cooldown_duration(),
                    "Rate limited; node dropped, cooling down"
                );
                self.state.set(WorkerState::Backoff);
                let outcome = self.ctx.pacer.cooldown(&self.token).await;
                self.state.set(WorkerState::Idle);
                Ok(outcome)
            }

            FetchError::Transient(reason) => {
                WorkerCounters::bump(&self.counters.transient_failures);
                tracing::warn!(worker = self.index, node = %id, %reason, "Giving up on node after transient failures");
                self.state.set(WorkerState::Idle);
                Ok(WaitOutcome::Elapsed)
            }

            FetchError::Malformed(reason) => {
                WorkerCounters::bump(&self.counters.malformed);
                tracing::warn!(worker = self.index, node = %id, %reason, "Unreadable profile page");
                self.state.set(WorkerState::Idle);
                Ok(WaitOutcome::Elapsed)
            }

            e @ (FetchError::NotFound | FetchError::PrivateOrInaccessible) => {
                WorkerCounters::bump(&self.counters.skipped);
                tracing::info!(worker = self.index, node = %id, "Skipping node: {}", e);
                self.state.set(WorkerState::Idle);
                Ok(WaitOutcome::Elapsed)
            }
        }
    }

    /// Fetches with up to `transient_retries` immediate retries
    ///
    /// No new attempt starts once a stop has been requested.
    async fn fetch_with_retries(&self, id: NodeId) -> Result<NodeRecord, FetchError> {
        let mut attempt = 0;
        loop {
            match self.ctx.fetcher.fetch(id).await {
                Err(e)
                    if e.is_retryable()
                        && attempt < self.ctx.transient_retries
                        && !self.token.is_cancelled() =>
                {
                    attempt += 1;
                    tracing::debug!(worker = self.index, node = %id, attempt, error = %e, "Retrying transient failure");
                }
                other => return other,
            }
        }
    }

    /// Persists a record and admits its neighbors
    ///
    /// A sink failure is logged and counted; neighbors are admitted
    /// regardless so traversal does not depend on persistence.
    fn handle_record(&self, record: NodeRecord) -> Result<(), FrontierError> {
        let id = record.id;
        let neighbors: Vec<NodeId> = record.neighbors.iter().copied().collect();

        if let Err(e) = self.ctx.sink.upsert(record) {
            WorkerCounters::bump(&self.counters.persist_failures);
            tracing::warn!(worker = self.index, node = %id, error = %e, "Failed to persist node");
        }

        let mut admitted = 0;
        for neighbor in &neighbors {
            if self.ctx.frontier.enqueue(*neighbor)? {
                admitted += 1;
            }
        }

        WorkerCounters::bump(&self.counters.processed);
        tracing::info!(
            worker = self.index,
            node = %id,
            neighbors = neighbors.len(),
            admitted,
            "Processed node"
        );

        Ok(())
    }
}
