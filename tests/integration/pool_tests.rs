//! Integration tests for the worker pool
//!
//! These tests drive a pool against an in-memory frontier and sink with a
//! scripted fetcher, so they exercise scheduling and shutdown without HTTP.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use steam_ripple::crawler::{CrawlContext, Frontier, MemoryFrontier, Pacer, WorkerPool};
use steam_ripple::fetcher::{FetchError, NodeFetcher, NodeRecord};
use steam_ripple::storage::{MemorySink, SqliteStorage};
use steam_ripple::{NodeId, RippleError, WorkerState};
use tokio::time::Instant;

fn id(n: u64) -> NodeId {
    NodeId::new(76561197960265728 + n)
}

fn raw(n: u64) -> String {
    id(n).to_string()
}

/// Serves a fixed graph and logs every fetch with its time
#[derive(Default)]
struct GraphFetcher {
    graph: HashMap<NodeId, Result<Vec<NodeId>, FetchError>>,
    aliases: HashMap<String, NodeId>,
    calls: Mutex<Vec<(NodeId, Instant)>>,
}

impl GraphFetcher {
    fn node(mut self, n: u64, friends: &[u64]) -> Self {
        self.graph
            .insert(id(n), Ok(friends.iter().copied().map(id).collect()));
        self
    }

    fn failing(mut self, n: u64, error: FetchError) -> Self {
        self.graph.insert(id(n), Err(error));
        self
    }

    fn alias(mut self, name: &str, n: u64) -> Self {
        self.aliases.insert(name.to_string(), id(n));
        self
    }

    fn calls_for(&self, node: NodeId) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| *n == node)
            .map(|(_, at)| *at)
            .collect()
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl NodeFetcher for GraphFetcher {
    async fn fetch(&self, node: NodeId) -> Result<NodeRecord, FetchError> {
        self.calls.lock().unwrap().push((node, Instant::now()));
        let friends = self.graph.get(&node).cloned().unwrap_or(Err(FetchError::NotFound))?;
        let mut record = NodeRecord::new(node, format!("test://{}", node));
        record.neighbors = friends.into_iter().collect();
        Ok(record)
    }

    async fn resolve_alias(&self, alias: &str) -> Result<NodeId, FetchError> {
        self.aliases.get(alias).copied().ok_or(FetchError::NotFound)
    }
}

struct Harness {
    pool: WorkerPool,
    frontier: Arc<MemoryFrontier>,
    sink: Arc<MemorySink>,
    fetcher: Arc<GraphFetcher>,
}

fn create_test_pool(fetcher: GraphFetcher, pacer: Pacer, empty_queue_timeout: Option<Duration>) -> Harness {
    let frontier = Arc::new(MemoryFrontier::new());
    let sink = Arc::new(MemorySink::new());
    let fetcher = Arc::new(fetcher);
    let ctx = CrawlContext {
        frontier: frontier.clone(),
        fetcher: fetcher.clone(),
        sink: sink.clone(),
        pacer,
        transient_retries: 0,
        empty_queue_timeout,
    };
    Harness {
        pool: WorkerPool::new(ctx, Duration::from_secs(5)),
        frontier,
        sink,
        fetcher,
    }
}

fn quick_pacer() -> Pacer {
    Pacer::new(
        Duration::from_millis(10),
        Duration::ZERO,
        Duration::ZERO,
        Duration::from_secs(60),
    )
}

#[tokio::test]
async fn test_small_graph_drains() {
    let fetcher = GraphFetcher::default()
        .node(1, &[2, 3])
        .node(2, &[1, 3])
        .node(3, &[1]);
    let mut h = create_test_pool(fetcher, quick_pacer(), Some(Duration::from_millis(100)));

    let accepted = h.pool.start(&[raw(1)], 2).await.unwrap();
    assert_eq!(accepted, 1);

    let report = h.pool.wait().await.unwrap();

    assert_eq!(report.drained, 2);
    assert_eq!(report.totals.processed, 3);
    assert_eq!(h.frontier.seen_count().unwrap(), 3);
    assert_eq!(h.frontier.size().unwrap(), 0);
    assert_eq!(h.sink.ids(), vec![id(1), id(2), id(3)]);
    assert_eq!(h.sink.upsert_count(), 3);
    assert_eq!(h.fetcher.call_count(), 3);
    assert!(h
        .pool
        .handles()
        .iter()
        .all(|w| w.state() == WorkerState::Stopped));
}

#[tokio::test]
async fn test_duplicate_seeds_admitted_once() {
    let fetcher = GraphFetcher::default().node(1, &[]);
    let mut h = create_test_pool(fetcher, quick_pacer(), Some(Duration::from_millis(50)));

    let accepted = h.pool.start(&[raw(1), raw(1)], 1).await.unwrap();
    assert_eq!(accepted, 1);

    h.pool.wait().await.unwrap();
    assert_eq!(h.fetcher.call_count(), 1);
}

#[tokio::test]
async fn test_alias_seed_resolved() {
    let fetcher = GraphFetcher::default().node(7, &[]).alias("known", 7);
    let mut h = create_test_pool(fetcher, quick_pacer(), Some(Duration::from_millis(50)));

    let seeds = vec!["https://steamcommunity.com/id/known/".to_string()];
    assert_eq!(h.pool.start(&seeds, 1).await.unwrap(), 1);

    h.pool.wait().await.unwrap();
    assert_eq!(h.sink.ids(), vec![id(7)]);
}

#[tokio::test]
async fn test_unresolvable_seed_fails_start() {
    let mut h = create_test_pool(GraphFetcher::default(), quick_pacer(), None);

    let result = h.pool.start(&[raw(1), "nobody".to_string()], 1).await;

    assert!(matches!(result, Err(RippleError::SeedResolution { .. })));
    assert!(h.pool.handles().is_empty());
    assert_eq!(h.frontier.seen_count().unwrap(), 0);
}

#[tokio::test]
async fn test_start_twice_rejected() {
    let mut h = create_test_pool(GraphFetcher::default(), quick_pacer(), None);

    h.pool.start(&[], 1).await.unwrap();
    assert!(matches!(
        h.pool.start(&[], 1).await,
        Err(RippleError::Pool(_))
    ));

    h.pool.stop_all().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_node_triggers_cooldown() {
    let fetcher = GraphFetcher::default()
        .failing(1, FetchError::RateLimited)
        .node(2, &[]);
    let pacer = Pacer::new(
        Duration::from_millis(10),
        Duration::ZERO,
        Duration::ZERO,
        Duration::from_secs(60),
    );
    let mut h = create_test_pool(fetcher, pacer, Some(Duration::from_millis(100)));

    h.pool.start(&[raw(1), raw(2)], 1).await.unwrap();
    let report = h.pool.wait().await.unwrap();

    let first = h.fetcher.calls_for(id(1));
    let second = h.fetcher.calls_for(id(2));
    assert_eq!(first.len(), 1, "rate-limited node must not be refetched");
    assert_eq!(second.len(), 1);
    assert!(second[0].duration_since(first[0]) >= Duration::from_secs(60));

    assert_eq!(report.totals.rate_limited, 1);
    assert_eq!(report.totals.processed, 1);
    assert_eq!(h.sink.ids(), vec![id(2)]);
}

#[tokio::test(start_paused = true)]
async fn test_not_found_skipped_without_pacing() {
    let fetcher = GraphFetcher::default().failing(1, FetchError::NotFound);
    let pacer = Pacer::new(
        Duration::from_millis(10),
        Duration::from_secs(30),
        Duration::from_secs(30),
        Duration::from_secs(60),
    );
    let mut h = create_test_pool(fetcher, pacer, Some(Duration::from_millis(100)));

    let start = Instant::now();
    h.pool.start(&[raw(1)], 1).await.unwrap();
    let report = h.pool.wait().await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(30));
    assert_eq!(report.totals.skipped, 1);
    assert!(h.sink.is_empty());
    assert_eq!(h.frontier.size().unwrap(), 0);
}

#[tokio::test]
async fn test_stop_during_idle_wait_is_prompt() {
    let pacer = Pacer::new(
        Duration::from_secs(10),
        Duration::ZERO,
        Duration::ZERO,
        Duration::from_secs(60),
    );
    let mut h = create_test_pool(GraphFetcher::default(), pacer, None);

    h.pool.start(&[], 3).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let report = tokio::time::timeout(Duration::from_secs(1), h.pool.stop_all())
        .await
        .expect("stop_all should finish well before the idle wait")
        .unwrap();

    assert_eq!(report.stopped, 3);
    assert_eq!(report.aborted, 0);
    assert!(h.pool.is_finished());
}

#[tokio::test]
async fn test_stop_single_worker() {
    let mut h = create_test_pool(GraphFetcher::default(), quick_pacer(), None);

    h.pool.start(&[], 2).await.unwrap();
    h.pool.handles()[0].stop();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let snapshot = h.pool.snapshot().unwrap();
    assert_eq!(snapshot.workers[0].state, WorkerState::Stopped);
    assert_ne!(snapshot.workers[1].state, WorkerState::Stopped);

    let report = h.pool.stop_all().await.unwrap();
    assert_eq!(report.stopped, 2);
}

#[tokio::test]
async fn test_shared_neighbors_fetched_once() {
    // Every node links to every other, so all workers race to enqueue the same ids
    let all: Vec<u64> = (1..=20).collect();
    let mut fetcher = GraphFetcher::default();
    for n in &all {
        fetcher = fetcher.node(*n, &all);
    }
    let mut h = create_test_pool(fetcher, quick_pacer(), Some(Duration::from_millis(100)));

    h.pool.start(&[raw(1), raw(2), raw(3)], 4).await.unwrap();
    let report = h.pool.wait().await.unwrap();

    assert_eq!(report.totals.processed, 20);
    assert_eq!(h.fetcher.call_count(), 20);
    assert_eq!(h.sink.upsert_count(), 20);
    for n in &all {
        assert_eq!(h.fetcher.calls_for(id(*n)).len(), 1);
    }
}

/// Never returns from a fetch, so only an abort ends its worker
struct HangingFetcher;

#[async_trait]
impl NodeFetcher for HangingFetcher {
    async fn fetch(&self, _node: NodeId) -> Result<NodeRecord, FetchError> {
        std::future::pending().await
    }

    async fn resolve_alias(&self, _alias: &str) -> Result<NodeId, FetchError> {
        Err(FetchError::NotFound)
    }
}

#[tokio::test]
async fn test_aborted_worker_reports_stopped_and_leaves_node_in_flight() {
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let ctx = CrawlContext {
        frontier: storage.clone(),
        fetcher: Arc::new(HangingFetcher),
        sink: storage.clone(),
        pacer: quick_pacer(),
        transient_retries: 0,
        empty_queue_timeout: None,
    };
    let mut pool = WorkerPool::new(ctx, Duration::from_millis(100));

    pool.start(&[raw(1)], 1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.snapshot().unwrap().workers[0].state, WorkerState::Fetching);

    let report = pool.stop_all().await.unwrap();
    assert_eq!(report.aborted, 1);

    let snapshot = pool.snapshot().unwrap();
    assert_eq!(snapshot.workers[0].state, WorkerState::Stopped);
    assert_eq!(snapshot.in_flight, 1);
    assert_eq!(snapshot.pending, 0);

    assert_eq!(storage.requeue_in_flight().unwrap(), 1);
    assert_eq!(storage.try_dequeue().unwrap(), Some(id(1)));
}
