//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Profile and friendship persistence
//! - The durable crawl frontier
//! - Run tracking and resumption support

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemorySink;
pub use sqlite::SqliteStorage;
pub use traits::{NodeSink, StorageError, StorageResult};

use crate::fetcher::BanStatus;
use crate::node::NodeId;

/// Represents a stored profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    pub id: NodeId,
    pub profile_url: String,
    pub level: u32,
    pub avatar_url: Option<String>,
    pub ban: Option<BanStatus>,
    pub first_seen_at: String,
    pub scraped_at: String,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
