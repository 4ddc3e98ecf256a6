//! SQLite storage implementation
//!
//! `SqliteStorage` is both the node sink and a durable [`Frontier`]: a
//! crawl that stops can pick up where it left off, with the same seen set.

use crate::crawler::{Frontier, FrontierError, FrontierResult, NodeOutcome};
use crate::fetcher::{BanKind, BanStatus, NodeRecord};
use crate::node::NodeId;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{NodeSink, StorageError, StorageResult};
use crate::storage::{ProfileRecord, RunRecord, RunStatus};
use crate::RippleError;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const BAN_DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite storage backend
///
/// The connection sits behind a mutex so one instance can be shared by all
/// workers as sink and frontier at once.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(RippleError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, RippleError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, RippleError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn lock_frontier(&self) -> FrontierResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| FrontierError::Poisoned)
    }

    // ===== Run Management =====

    /// Creates a new crawl run in the `running` state
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    pub fn create_run(&self, config_hash: &str) -> StorageResult<i64> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Gets a run by ID
    pub fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
            params![run_id],
            run_from_row,
        )
        .optional()?
        .ok_or(StorageError::RunNotFound(run_id))
    }

    /// Gets the most recent run
    pub fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let conn = self.lock()?;
        let run = conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    /// Updates the status of a run, stamping `finished_at` for final states
    pub fn update_run_status(&self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let conn = self.lock()?;
        let finished_at = match status {
            RunStatus::Running => None,
            _ => Some(Utc::now().to_rfc3339()),
        };
        let changed = conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), finished_at, run_id],
        )?;
        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Frontier Maintenance =====

    /// Empties the seen set, the pending queue, in-flight ids and outcomes
    ///
    /// Used when starting a fresh crawl. Stored profiles are kept.
    pub fn clear_frontier(&self) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM frontier_pending", [])?;
        tx.execute("DELETE FROM frontier_inflight", [])?;
        tx.execute("DELETE FROM frontier_outcomes", [])?;
        tx.execute("DELETE FROM frontier_seen", [])?;
        tx.commit()?;
        Ok(())
    }

    /// Puts ids left in flight by an earlier process back at the head of
    /// the pending queue
    ///
    /// The seen set is untouched, so admission stays at-most-once. Call this
    /// only while no worker is running against this database.
    ///
    /// # Returns
    ///
    /// The number of ids made pending again
    pub fn requeue_in_flight(&self) -> StorageResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let stranded: Vec<i64> = {
            let mut stmt =
                tx.prepare("SELECT steamid64 FROM frontier_inflight ORDER BY dequeued_at, steamid64")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };

        // Sequence numbers below the current head put these ids first
        let head: i64 = tx.query_row(
            "SELECT COALESCE(MIN(seq), 1) FROM frontier_pending",
            [],
            |row| row.get(0),
        )?;
        let base = head.min(1) - stranded.len() as i64;

        let mut requeued = 0;
        for (offset, raw) in stranded.iter().enumerate() {
            let seq = base + offset as i64;
            requeued += tx.execute(
                "INSERT OR IGNORE INTO frontier_pending (seq, steamid64) VALUES (?1, ?2)",
                params![seq, raw],
            )?;
        }
        tx.execute("DELETE FROM frontier_inflight", [])?;
        tx.commit()?;
        Ok(requeued)
    }

    /// Ids whose last recorded outcome is `outcome`, ascending
    pub fn nodes_with_outcome(&self, outcome: NodeOutcome) -> StorageResult<Vec<NodeId>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT steamid64 FROM frontier_outcomes WHERE outcome = ?1 ORDER BY steamid64",
        )?;
        let ids = stmt
            .query_map(params![outcome.to_db_string()], |row| {
                Ok(from_sql_id(row.get::<_, i64>(0)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Finished id counts per outcome
    pub fn outcome_breakdown(&self) -> StorageResult<BTreeMap<NodeOutcome, u64>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT outcome, COUNT(*) FROM frontier_outcomes GROUP BY outcome")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut breakdown = BTreeMap::new();
        for row in rows {
            let (outcome, count) = row?;
            if let Some(outcome) = NodeOutcome::from_db_string(&outcome) {
                breakdown.insert(outcome, count as u64);
            }
        }
        Ok(breakdown)
    }

    // ===== Profile Queries =====

    /// Gets a stored profile by id
    pub fn get_profile(&self, id: NodeId) -> StorageResult<Option<ProfileRecord>> {
        let conn = self.lock()?;
        let profile = conn
            .query_row(
                "SELECT steamid64, profile_url, steam_level, avatar_url, ban_type, ban_date,
                 first_seen_at, scraped_at
                 FROM profiles WHERE steamid64 = ?1",
                params![to_sql_id(id)],
                profile_from_row,
            )
            .optional()?;
        Ok(profile)
    }

    /// Gets the friend ids recorded for a profile, ascending
    pub fn get_friends(&self, id: NodeId) -> StorageResult<Vec<NodeId>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT friend_steamid64 FROM friendships WHERE steamid64 = ?1
             ORDER BY friend_steamid64",
        )?;
        let friends = stmt
            .query_map(params![to_sql_id(id)], |row| {
                Ok(from_sql_id(row.get::<_, i64>(0)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(friends)
    }

    // ===== Statistics =====

    pub fn count_profiles(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM profiles")
    }

    pub fn count_banned_profiles(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM profiles WHERE is_banned = 1")
    }

    pub fn count_friendships(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM friendships")
    }

    /// Mean level across stored profiles; None when there are none
    pub fn average_level(&self) -> StorageResult<Option<f64>> {
        let conn = self.lock()?;
        let avg: Option<f64> =
            conn.query_row("SELECT AVG(steam_level) FROM profiles", [], |row| {
                row.get(0)
            })?;
        Ok(avg)
    }

    /// Banned profile counts per ban kind
    pub fn ban_breakdown(&self) -> StorageResult<BTreeMap<BanKind, u64>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT ban_type, COUNT(*) FROM profiles
             WHERE is_banned = 1 AND ban_type IS NOT NULL
             GROUP BY ban_type",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut breakdown = BTreeMap::new();
        for row in rows {
            let (kind, count) = row?;
            if let Some(kind) = BanKind::from_db_string(&kind) {
                breakdown.insert(kind, count as u64);
            }
        }
        Ok(breakdown)
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl NodeSink for SqliteStorage {
    fn upsert(&self, record: NodeRecord) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        let id = to_sql_id(record.id);

        let (ban_type, ban_date) = match &record.ban {
            Some(ban) => (
                Some(ban.kind.to_db_string()),
                ban.date.map(|d| d.format(BAN_DATE_FORMAT).to_string()),
            ),
            None => (None, None),
        };

        tx.execute(
            "INSERT INTO profiles (steamid64, profile_url, steam_level, avatar_url, is_banned,
                                   ban_type, ban_date, first_seen_at, scraped_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
             ON CONFLICT(steamid64) DO UPDATE SET
                 profile_url = excluded.profile_url,
                 steam_level = excluded.steam_level,
                 avatar_url = excluded.avatar_url,
                 is_banned = excluded.is_banned,
                 ban_type = excluded.ban_type,
                 ban_date = excluded.ban_date,
                 scraped_at = excluded.scraped_at",
            params![
                id,
                record.profile_url,
                record.level,
                record.avatar_url,
                record.is_banned(),
                ban_type,
                ban_date,
                now
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO friendships (steamid64, friend_steamid64, discovered_at)
                 VALUES (?1, ?2, ?3)",
            )?;
            for friend in &record.neighbors {
                stmt.execute(params![id, to_sql_id(*friend), now])?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

impl Frontier for SqliteStorage {
    fn seed(&self, ids: &[NodeId]) -> FrontierResult<usize> {
        let mut conn = self.lock_frontier()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        let mut accepted = 0;
        for id in ids {
            if admit(&tx, *id, &now)? {
                accepted += 1;
            }
        }
        tx.commit()?;
        Ok(accepted)
    }

    fn try_dequeue(&self) -> FrontierResult<Option<NodeId>> {
        let mut conn = self.lock_frontier()?;
        let tx = conn.transaction()?;
        let next: Option<(i64, i64)> = tx
            .query_row(
                "SELECT seq, steamid64 FROM frontier_pending ORDER BY seq LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((seq, raw)) = next else {
            return Ok(None);
        };

        tx.execute("DELETE FROM frontier_pending WHERE seq = ?1", params![seq])?;
        tx.execute(
            "INSERT OR REPLACE INTO frontier_inflight (steamid64, dequeued_at) VALUES (?1, ?2)",
            params![raw, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(Some(from_sql_id(raw)))
    }

    fn finish(&self, id: NodeId, outcome: NodeOutcome) -> FrontierResult<()> {
        let mut conn = self.lock_frontier()?;
        let tx = conn.transaction()?;
        let raw = to_sql_id(id);
        tx.execute(
            "DELETE FROM frontier_inflight WHERE steamid64 = ?1",
            params![raw],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO frontier_outcomes (steamid64, outcome, recorded_at)
             VALUES (?1, ?2, ?3)",
            params![raw, outcome.to_db_string(), Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn enqueue(&self, id: NodeId) -> FrontierResult<bool> {
        let mut conn = self.lock_frontier()?;
        let tx = conn.transaction()?;
        let inserted = admit(&tx, id, &Utc::now().to_rfc3339())?;
        tx.commit()?;
        Ok(inserted)
    }

    fn size(&self) -> FrontierResult<usize> {
        let conn = self.lock_frontier()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM frontier_pending", [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }

    fn seen_count(&self) -> FrontierResult<usize> {
        let conn = self.lock_frontier()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM frontier_seen", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn in_flight(&self) -> FrontierResult<usize> {
        let conn = self.lock_frontier()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM frontier_inflight", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Insert-and-test on the seen set; appends to pending only on first sight
fn admit(conn: &Connection, id: NodeId, now: &str) -> Result<bool, rusqlite::Error> {
    let raw = to_sql_id(id);
    let changed = conn.execute(
        "INSERT OR IGNORE INTO frontier_seen (steamid64, seen_at) VALUES (?1, ?2)",
        params![raw, now],
    )?;
    if changed == 0 {
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO frontier_pending (steamid64) VALUES (?1)",
        params![raw],
    )?;
    Ok(true)
}

// SteamID64 values stay well below i64::MAX
fn to_sql_id(id: NodeId) -> i64 {
    id.as_u64() as i64
}

fn from_sql_id(raw: i64) -> NodeId {
    NodeId::new(raw as u64)
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
    })
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<ProfileRecord> {
    let ban_type: Option<String> = row.get(4)?;
    let ban_date: Option<String> = row.get(5)?;

    let ban = ban_type
        .as_deref()
        .and_then(BanKind::from_db_string)
        .map(|kind| BanStatus {
            kind,
            date: ban_date
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, BAN_DATE_FORMAT).ok()),
        });

    Ok(ProfileRecord {
        id: from_sql_id(row.get(0)?),
        profile_url: row.get(1)?,
        level: row.get(2)?,
        avatar_url: row.get(3)?,
        ban,
        first_seen_at: row.get(6)?,
        scraped_at: row.get(7)?,
    })
}
