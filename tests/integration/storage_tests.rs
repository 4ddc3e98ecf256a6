//! Integration tests for SQLite-backed storage
//!
//! These tests use on-disk databases in temporary directories to check
//! that the frontier and profile data survive reopening.

use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use steam_ripple::crawler::{Frontier, NodeOutcome};
use steam_ripple::fetcher::{BanKind, BanStatus, NodeRecord};
use steam_ripple::storage::{NodeSink, RunStatus, SqliteStorage};
use steam_ripple::NodeId;
use tempfile::TempDir;

fn id(n: u64) -> NodeId {
    NodeId::new(76561197960265728 + n)
}

fn open(dir: &TempDir) -> SqliteStorage {
    SqliteStorage::new(&dir.path().join("crawl.db")).unwrap()
}

#[test]
fn test_frontier_survives_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let storage = open(&dir);
        assert_eq!(storage.seed(&[id(1), id(2), id(3)]).unwrap(), 3);
        assert_eq!(storage.try_dequeue().unwrap(), Some(id(1)));
        assert!(storage.enqueue(id(4)).unwrap());
    }

    let storage = open(&dir);
    assert_eq!(storage.seen_count().unwrap(), 4);
    assert_eq!(storage.size().unwrap(), 3);

    // Already-seen ids stay rejected after reopening, including dequeued ones
    assert!(!storage.enqueue(id(1)).unwrap());
    assert!(!storage.enqueue(id(3)).unwrap());

    assert_eq!(storage.try_dequeue().unwrap(), Some(id(2)));
    assert_eq!(storage.try_dequeue().unwrap(), Some(id(3)));
    assert_eq!(storage.try_dequeue().unwrap(), Some(id(4)));
    assert_eq!(storage.try_dequeue().unwrap(), None);
}

#[test]
fn test_clear_frontier_keeps_profiles() {
    let dir = TempDir::new().unwrap();
    let storage = open(&dir);

    storage.seed(&[id(1), id(2)]).unwrap();
    storage.upsert(NodeRecord::new(id(1), "test://1")).unwrap();
    storage.clear_frontier().unwrap();

    assert_eq!(storage.seen_count().unwrap(), 0);
    assert_eq!(storage.size().unwrap(), 0);
    assert_eq!(storage.count_profiles().unwrap(), 1);
    assert!(storage.enqueue(id(1)).unwrap());
}

#[test]
fn test_profile_upsert_and_friends() {
    let dir = TempDir::new().unwrap();

    {
        let storage = open(&dir);
        let mut record = NodeRecord::new(id(1), "test://1");
        record.level = 30;
        record.avatar_url = Some("https://cdn.example/a.jpg".to_string());
        record.ban = Some(BanStatus {
            kind: BanKind::Vac,
            date: NaiveDate::from_ymd_opt(2023, 5, 1),
        });
        record.neighbors.insert(id(2));
        record.neighbors.insert(id(3));
        storage.upsert(record).unwrap();
    }

    let storage = open(&dir);
    let profile = storage.get_profile(id(1)).unwrap().unwrap();
    assert_eq!(profile.level, 30);
    assert_eq!(profile.avatar_url.as_deref(), Some("https://cdn.example/a.jpg"));
    assert_eq!(
        profile.ban,
        Some(BanStatus {
            kind: BanKind::Vac,
            date: NaiveDate::from_ymd_opt(2023, 5, 1),
        })
    );
    assert_eq!(storage.get_friends(id(1)).unwrap(), vec![id(2), id(3)]);

    // Re-scraping updates attributes, keeps first_seen_at and never duplicates edges
    let mut again = NodeRecord::new(id(1), "test://1");
    again.level = 31;
    again.neighbors.insert(id(2));
    storage.upsert(again).unwrap();

    let updated = storage.get_profile(id(1)).unwrap().unwrap();
    assert_eq!(updated.level, 31);
    assert_eq!(updated.ban, None);
    assert_eq!(updated.first_seen_at, profile.first_seen_at);
    assert_eq!(storage.count_friendships().unwrap(), 2);
    assert_eq!(storage.count_profiles().unwrap(), 1);
}

#[test]
fn test_run_lifecycle() {
    let dir = TempDir::new().unwrap();
    let storage = open(&dir);

    let first = storage.create_run("abc").unwrap();
    storage
        .update_run_status(first, RunStatus::Interrupted)
        .unwrap();
    let second = storage.create_run("abc").unwrap();
    assert!(second > first);

    let latest = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(latest.id, second);
    assert_eq!(latest.status, RunStatus::Running);
    assert!(latest.finished_at.is_none());

    storage
        .update_run_status(second, RunStatus::Completed)
        .unwrap();
    let done = storage.get_run(second).unwrap();
    assert_eq!(done.status, RunStatus::Completed);
    assert!(done.finished_at.is_some());

    assert_eq!(
        storage.get_run(first).unwrap().status,
        RunStatus::Interrupted
    );
    assert!(storage
        .update_run_status(first + 100, RunStatus::Failed)
        .is_err());
}

#[test]
fn test_interrupted_dequeue_is_requeued_on_resume() {
    let dir = TempDir::new().unwrap();
    {
        let storage = open(&dir);
        storage.seed(&[id(1), id(2), id(3)]).unwrap();
        assert_eq!(storage.try_dequeue().unwrap(), Some(id(1)));
        assert_eq!(storage.try_dequeue().unwrap(), Some(id(2)));
        storage.finish(id(1), NodeOutcome::Processed).unwrap();
        // Run dies with id(2) still being fetched
    }

    let storage = open(&dir);
    assert_eq!(storage.in_flight().unwrap(), 1);
    assert_eq!(storage.requeue_in_flight().unwrap(), 1);
    assert_eq!(storage.in_flight().unwrap(), 0);

    assert_eq!(storage.try_dequeue().unwrap(), Some(id(2)));
    assert_eq!(storage.try_dequeue().unwrap(), Some(id(3)));
    assert_eq!(storage.try_dequeue().unwrap(), None);

    assert_eq!(storage.seen_count().unwrap(), 3);
    assert_eq!(storage.seed(&[id(1), id(2), id(3)]).unwrap(), 0);
}

#[test]
fn test_outcomes_persist_across_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let storage = open(&dir);
        storage.seed(&[id(1), id(2), id(3)]).unwrap();
        for outcome in [
            NodeOutcome::Processed,
            NodeOutcome::RateLimited,
            NodeOutcome::RateLimited,
        ] {
            let next = storage.try_dequeue().unwrap().unwrap();
            storage.finish(next, outcome).unwrap();
        }
    }

    let storage = open(&dir);
    assert_eq!(storage.requeue_in_flight().unwrap(), 0);
    assert_eq!(
        storage.nodes_with_outcome(NodeOutcome::RateLimited).unwrap(),
        vec![id(2), id(3)]
    );
    let breakdown = storage.outcome_breakdown().unwrap();
    assert_eq!(breakdown.get(&NodeOutcome::Processed), Some(&1));
    assert_eq!(breakdown.get(&NodeOutcome::RateLimited), Some(&2));
}

#[test]
fn test_concurrent_enqueue_and_dequeue() {
    const THREADS: usize = 8;
    const IDS: u64 = 50;

    let dir = TempDir::new().unwrap();
    let storage = Arc::new(open(&dir));

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let storage = Arc::clone(&storage);
            thread::spawn(move || {
                let mut accepted = 0;
                for n in 0..IDS {
                    if storage.enqueue(id(n)).unwrap() {
                        accepted += 1;
                    }
                }
                let mut taken = Vec::new();
                while let Some(next) = storage.try_dequeue().unwrap() {
                    taken.push(next);
                }
                (accepted, taken)
            })
        })
        .collect();

    let mut accepted = 0;
    let mut taken = Vec::new();
    for worker in workers {
        let (a, t) = worker.join().unwrap();
        accepted += a;
        taken.extend(t);
    }
    while let Some(next) = storage.try_dequeue().unwrap() {
        taken.push(next);
    }

    assert_eq!(accepted, IDS as usize);
    assert_eq!(taken.len(), IDS as usize);
    let unique: HashSet<_> = taken.iter().copied().collect();
    assert_eq!(unique.len(), IDS as usize);
    assert_eq!(storage.seen_count().unwrap(), IDS as usize);
    assert_eq!(storage.in_flight().unwrap(), IDS as usize);
}
