//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Steam-Ripple database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- One row per fetched profile
CREATE TABLE IF NOT EXISTS profiles (
    steamid64 INTEGER PRIMARY KEY,
    profile_url TEXT NOT NULL,
    steam_level INTEGER NOT NULL DEFAULT 0,
    avatar_url TEXT,
    is_banned INTEGER NOT NULL DEFAULT 0,
    ban_type TEXT,
    ban_date TEXT,
    first_seen_at TEXT NOT NULL,
    scraped_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_profiles_banned ON profiles(is_banned);

-- Friend edges as reported by the owning profile
CREATE TABLE IF NOT EXISTS friendships (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    steamid64 INTEGER NOT NULL,
    friend_steamid64 INTEGER NOT NULL,
    discovered_at TEXT NOT NULL,
    UNIQUE(steamid64, friend_steamid64)
);

CREATE INDEX IF NOT EXISTS idx_friendships_owner ON friendships(steamid64);
CREATE INDEX IF NOT EXISTS idx_friendships_friend ON friendships(friend_steamid64);

-- Every id ever admitted to the frontier
CREATE TABLE IF NOT EXISTS frontier_seen (
    steamid64 INTEGER PRIMARY KEY,
    seen_at TEXT NOT NULL
);

-- Ids waiting to be fetched, in admission order
CREATE TABLE IF NOT EXISTS frontier_pending (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    steamid64 INTEGER NOT NULL UNIQUE REFERENCES frontier_seen(steamid64)
);

-- Ids handed to a worker whose outcome is not recorded yet
CREATE TABLE IF NOT EXISTS frontier_inflight (
    steamid64 INTEGER PRIMARY KEY REFERENCES frontier_seen(steamid64),
    dequeued_at TEXT NOT NULL
);

-- Terminal outcome of every finished id
CREATE TABLE IF NOT EXISTS frontier_outcomes (
    steamid64 INTEGER PRIMARY KEY REFERENCES frontier_seen(steamid64),
    outcome TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_frontier_outcomes_outcome ON frontier_outcomes(outcome);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
