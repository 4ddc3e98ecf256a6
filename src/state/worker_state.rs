//! Worker state definitions for tracking crawl progress
//!
//! A worker moves `Idle → Fetching → {Idle, Backoff} → Idle → … → Stopped`.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Represents the current run status of a crawl worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// Waiting for work (polling an empty frontier or between iterations)
    Idle,

    /// A fetch is in flight
    Fetching,

    /// Cooling down after the remote source signaled throttling
    Backoff,

    /// The worker loop has exited; terminal
    Stopped,
}

impl WorkerState {
    /// Converts the state to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Backoff => "backoff",
            Self::Stopped => "stopped",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Fetching => 1,
            Self::Backoff => 2,
            Self::Stopped => 3,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Fetching,
            2 => Self::Backoff,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shared holder for a worker's state
///
/// Only the owning worker calls [`WorkerStateCell::set`]; everyone else reads.
#[derive(Debug)]
pub struct WorkerStateCell(AtomicU8);

impl WorkerStateCell {
    pub fn new(state: WorkerState) -> Self {
        Self(AtomicU8::new(state.to_u8()))
    }

    pub fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: WorkerState) {
        self.0.store(state.to_u8(), Ordering::Release);
    }
}

impl Default for WorkerStateCell {
    fn default() -> Self {
        Self::new(WorkerState::Idle)
    }
}

/// Per-worker outcome tallies
#[derive(Debug, Default)]
pub struct WorkerCounters {
    /// Nodes fetched and handed to the sink
    pub processed: AtomicU64,

    /// Nodes that were missing or private
    pub skipped: AtomicU64,

    /// Nodes whose page could not be read as a profile
    pub malformed: AtomicU64,

    /// Nodes dropped after a rate-limit response
    pub rate_limited: AtomicU64,

    /// Nodes abandoned after exhausting transient retries
    pub transient_failures: AtomicU64,

    /// Sink upserts that returned an error
    pub persist_failures: AtomicU64,
}

impl WorkerCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of the counters
    pub fn snapshot(&self) -> WorkerCountersSnapshot {
        WorkerCountersSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            transient_failures: self.transient_failures.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`WorkerCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerCountersSnapshot {
    pub processed: u64,
    pub skipped: u64,
    pub malformed: u64,
    pub rate_limited: u64,
    pub transient_failures: u64,
    pub persist_failures: u64,
}

impl WorkerCountersSnapshot {
    /// Total nodes this worker took off the frontier
    pub fn total(&self) -> u64 {
        self.processed + self.skipped + self.malformed + self.rate_limited + self.transient_failures
    }

    /// Adds another worker's tallies into this one
    pub fn merge(&mut self, other: &WorkerCountersSnapshot) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.malformed += other.malformed;
        self.rate_limited += other.rate_limited;
        self.transient_failures += other.transient_failures;
        self.persist_failures += other.persist_failures;
    }
}
