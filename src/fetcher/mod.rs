//! Node fetching boundary
//!
//! This module defines what the crawl core needs from the remote source:
//! - `NodeFetcher`: fetch one node's record, resolve an alias to an id
//! - `FetchError`: the outcome taxonomy workers branch on
//! - `NodeRecord`: attributes and neighbors of a fetched node
//!
//! `SteamFetcher` is the HTTP adapter for Steam Community pages. The crawl
//! core never depends on it directly.

mod client;
mod parser;

pub use client::{build_http_client, SteamFetcher};
pub use parser::{extract_friend_ids, find_profile_id, parse_profile_page, ParsedProfile};

use crate::node::NodeId;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Outcome of a failed fetch
///
/// Workers treat each variant differently: `RateLimited` triggers a
/// cooldown, `Transient` may be retried, `Malformed` is counted on its own,
/// the rest are skipped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Remote source is throttling requests")]
    RateLimited,

    #[error("Node does not exist")]
    NotFound,

    #[error("Node is private or inaccessible")]
    PrivateOrInaccessible,

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Returns true if an immediate retry might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Kind of ban shown on a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BanKind {
    Vac,
    Game,
    Community,
    Trade,
}

impl BanKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Vac => "VAC",
            Self::Game => "Game",
            Self::Community => "Community",
            Self::Trade => "Trade",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "VAC" => Some(Self::Vac),
            "Game" => Some(Self::Game),
            "Community" => Some(Self::Community),
            "Trade" => Some(Self::Trade),
            _ => None,
        }
    }
}

impl fmt::Display for BanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Ban marker on a profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanStatus {
    pub kind: BanKind,

    /// Day of the most recent ban, when the page reports it
    pub date: Option<NaiveDate>,
}

/// Everything learned from one successful fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: NodeId,
    pub profile_url: String,
    pub level: u32,
    pub avatar_url: Option<String>,
    pub ban: Option<BanStatus>,
    pub neighbors: BTreeSet<NodeId>,
}

impl NodeRecord {
    /// Creates a record with no attributes and no neighbors
    pub fn new(id: NodeId, profile_url: impl Into<String>) -> Self {
        Self {
            id,
            profile_url: profile_url.into(),
            level: 0,
            avatar_url: None,
            ban: None,
            neighbors: BTreeSet::new(),
        }
    }

    pub fn is_banned(&self) -> bool {
        self.ban.is_some()
    }
}

/// Source of node records
///
/// Implementations perform exactly one attempt per call. Retries and
/// backoff belong to the caller.
#[async_trait]
pub trait NodeFetcher: Send + Sync {
    /// Fetches a node's attributes and its neighbor list
    async fn fetch(&self, id: NodeId) -> Result<NodeRecord, FetchError>;

    /// Resolves a vanity alias to a canonical id
    async fn resolve_alias(&self, alias: &str) -> Result<NodeId, FetchError>;
}
