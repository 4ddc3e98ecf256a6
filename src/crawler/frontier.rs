//! Deduplicating crawl frontier
//!
//! The frontier pairs a *seen* set with a *pending* FIFO:
//! - an id enters `seen` at most once and never leaves it
//! - every pending id is also in `seen`
//! - `enqueue` is a single insert-and-test, so two workers racing to enqueue
//!   the same neighbor cannot both succeed
//! - a dequeued id stays *in flight* until the worker calls `finish`
//!
//! [`MemoryFrontier`] keeps both structures under one mutex. The durable
//! implementation lives in [`crate::storage::SqliteStorage`].

use crate::fetcher::FetchError;
use crate::node::NodeId;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;

/// Errors raised by a frontier backend
///
/// Any of these is fatal for a crawl: the pool cannot keep its
/// at-most-once guarantee once the frontier is in an unknown state.
#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("Frontier lock poisoned")]
    Poisoned,

    #[error("Frontier backend error: {0}")]
    Backend(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for frontier operations
pub type FrontierResult<T> = Result<T, FrontierError>;

/// How the handling of a dequeued id ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeOutcome {
    /// Fetched, handed to the sink, neighbors admitted
    Processed,

    /// Dropped after the remote source throttled the request
    RateLimited,

    NotFound,

    Private,

    /// The page could not be read as a profile
    Malformed,

    /// Transient failures outlasted the retries
    TransientExhausted,
}

impl NodeOutcome {
    /// Converts to the string stored in the database
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::RateLimited => "rate_limited",
            Self::NotFound => "not_found",
            Self::Private => "private",
            Self::Malformed => "malformed",
            Self::TransientExhausted => "transient_exhausted",
        }
    }

    /// Parses a stored outcome string
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "processed" => Some(Self::Processed),
            "rate_limited" => Some(Self::RateLimited),
            "not_found" => Some(Self::NotFound),
            "private" => Some(Self::Private),
            "malformed" => Some(Self::Malformed),
            "transient_exhausted" => Some(Self::TransientExhausted),
            _ => None,
        }
    }
}

impl From<&FetchError> for NodeOutcome {
    fn from(error: &FetchError) -> Self {
        match error {
            FetchError::RateLimited => Self::RateLimited,
            FetchError::NotFound => Self::NotFound,
            FetchError::PrivateOrInaccessible => Self::Private,
            FetchError::Malformed(_) => Self::Malformed,
            FetchError::Transient(_) => Self::TransientExhausted,
        }
    }
}

impl fmt::Display for NodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Shared work queue with at-most-once admission
pub trait Frontier: Send + Sync {
    /// Admits a batch of start nodes
    ///
    /// Duplicates within the batch, and ids already seen, are ignored.
    ///
    /// # Returns
    ///
    /// The number of ids that were newly admitted
    fn seed(&self, ids: &[NodeId]) -> FrontierResult<usize> {
        let mut accepted = 0;
        for id in ids {
            if self.enqueue(*id)? {
                accepted += 1;
            }
        }
        Ok(accepted)
    }

    /// Removes and returns the oldest pending id, without blocking
    ///
    /// The id is in flight until [`Frontier::finish`] is called for it.
    fn try_dequeue(&self) -> FrontierResult<Option<NodeId>>;

    /// Records the outcome of a dequeued id and ends its in-flight period
    fn finish(&self, id: NodeId, outcome: NodeOutcome) -> FrontierResult<()>;

    /// Admits an id if it has never been seen
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The id was new and is now pending
    /// * `Ok(false)` - The id was already seen; nothing changed
    fn enqueue(&self, id: NodeId) -> FrontierResult<bool>;

    /// Number of pending ids
    fn size(&self) -> FrontierResult<usize>;

    /// Number of ids ever admitted
    fn seen_count(&self) -> FrontierResult<usize>;

    /// Number of ids dequeued but not yet finished
    fn in_flight(&self) -> FrontierResult<usize>;
}

#[derive(Debug, Default)]
struct FrontierInner {
    seen: HashSet<NodeId>,
    pending: VecDeque<NodeId>,
    in_flight: HashSet<NodeId>,
}

/// In-process frontier
#[derive(Debug, Default)]
pub struct MemoryFrontier {
    inner: Mutex<FrontierInner>,
}

impl MemoryFrontier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> FrontierResult<std::sync::MutexGuard<'_, FrontierInner>> {
        self.inner.lock().map_err(|_| FrontierError::Poisoned)
    }
}

impl Frontier for MemoryFrontier {
    fn seed(&self, ids: &[NodeId]) -> FrontierResult<usize> {
        let mut inner = self.lock()?;
        let mut accepted = 0;
        for id in ids {
            if inner.seen.insert(*id) {
                inner.pending.push_back(*id);
                accepted += 1;
            }
        }
        Ok(accepted)
    }

    fn try_dequeue(&self) -> FrontierResult<Option<NodeId>> {
        let mut inner = self.lock()?;
        let next = inner.pending.pop_front();
        if let Some(id) = next {
            inner.in_flight.insert(id);
        }
        Ok(next)
    }

    fn finish(&self, id: NodeId, _outcome: NodeOutcome) -> FrontierResult<()> {
        self.lock()?.in_flight.remove(&id);
        Ok(())
    }

    fn enqueue(&self, id: NodeId) -> FrontierResult<bool> {
        let mut inner = self.lock()?;
        if !inner.seen.insert(id) {
            return Ok(false);
        }
        inner.pending.push_back(id);
        Ok(true)
    }

    fn size(&self) -> FrontierResult<usize> {
        Ok(self.lock()?.pending.len())
    }

    fn seen_count(&self) -> FrontierResult<usize> {
        Ok(self.lock()?.seen.len())
    }

    fn in_flight(&self) -> FrontierResult<usize> {
        Ok(self.lock()?.in_flight.len())
    }
}
