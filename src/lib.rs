//! Steam-Ripple: a polite social graph crawler
//!
//! This crate walks the Steam Community friend graph outward from one or more
//! seed profiles. A shared, deduplicating frontier feeds a pool of workers that
//! fetch profiles, persist them, and enqueue newly discovered friends.

pub mod config;
pub mod crawler;
pub mod fetcher;
pub mod node;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Steam-Ripple operations
#[derive(Debug, Error)]
pub enum RippleError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Identifier error: {0}")]
    Id(#[from] IdError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetcher::FetchError),

    #[error("Frontier error: {0}")]
    Frontier(#[from] crawler::FrontierError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Could not resolve seed '{input}': {reason}")]
    SeedResolution { input: String, reason: String },

    #[error("Worker pool error: {0}")]
    Pool(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Node identifier errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("Empty identifier")]
    Empty,

    #[error("Not a valid SteamID64: {0}")]
    InvalidSteamId(String),

    #[error("Unrecognized identifier format: {0}")]
    Unrecognized(String),

    #[error("Malformed profile locator: {0}")]
    Malformed(String),
}

/// Result type alias for Steam-Ripple operations
pub type Result<T> = std::result::Result<T, RippleError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for identifier operations
pub type IdResult<T> = std::result::Result<T, IdError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Frontier, MemoryFrontier, PoolSnapshot, WorkerPool};
pub use fetcher::{FetchError, NodeFetcher, NodeRecord, SteamFetcher};
pub use node::{normalize_node_ref, NodeId, NodeRef};
pub use state::WorkerState;
pub use storage::{MemorySink, NodeSink, SqliteStorage};
