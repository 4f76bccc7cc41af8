// SQLite persistence layer: the durable pick log and draft key/value state.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection};

use crate::draft::engine::PickLog;
use crate::draft::pick::Pick;

/// SQLite-backed persistence for committed picks and key-value draft state.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the pick log database at `path`, creating the schema on first
    /// use. `":memory:"` gives a throwaway database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS draft_picks (
                pick_number INTEGER NOT NULL,
                round       INTEGER NOT NULL,
                user_email  TEXT NOT NULL,
                user_name   TEXT NOT NULL,
                golfer_name TEXT NOT NULL,
                draft_id    TEXT NOT NULL DEFAULT '',
                timestamp   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (pick_number, draft_id)
            );

            CREATE TABLE IF NOT EXISTS draft_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_draft_picks_draft_id ON draft_picks(draft_id);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lock the connection. A poisoned lock means a writer panicked
    /// mid-statement, which is unrecoverable here.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Record a single committed pick. Uses INSERT OR IGNORE, so appending
    /// the same pick number twice for one draft is a no-op. Timestamp is
    /// auto-generated by SQLite.
    pub fn record_pick(&self, pick: &Pick, draft_id: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO draft_picks
                (pick_number, round, user_email, user_name, golfer_name, draft_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                pick.pick_number,
                pick.round,
                pick.user_email,
                pick.user_name,
                pick.golfer_name,
                draft_id,
            ],
        )
        .context("failed to record draft pick")?;
        Ok(())
    }

    /// Load the picks of one draft session, ordered by pick number.
    pub fn load_picks(&self, draft_id: &str) -> Result<Vec<Pick>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT round, pick_number, user_email, user_name, golfer_name
                 FROM draft_picks WHERE draft_id = ?1 ORDER BY pick_number",
            )
            .context("failed to prepare load_picks query")?;

        let picks = stmt
            .query_map(params![draft_id], |row| {
                Ok(Pick {
                    round: row.get(0)?,
                    pick_number: row.get(1)?,
                    user_email: row.get(2)?,
                    user_name: row.get(3)?,
                    golfer_name: row.get(4)?,
                })
            })
            .context("failed to query draft picks")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map draft pick rows")?;

        Ok(picks)
    }

    /// Store `value` as JSON under `key`, replacing any earlier value.
    pub fn save_state(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.conn();
        let json_str =
            serde_json::to_string(value).context("failed to serialize state value")?;
        conn.execute(
            "INSERT OR REPLACE INTO draft_state (key, value) VALUES (?1, ?2)",
            params![key, json_str],
        )
        .context("failed to save state")?;
        Ok(())
    }

    /// JSON value stored under `key`, if any.
    pub fn load_state(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT value FROM draft_state WHERE key = ?1")
            .context("failed to prepare load_state query")?;

        let mut rows = stmt
            .query_map(params![key], |row| row.get::<_, String>(0))
            .context("failed to query draft state")?;

        match rows.next() {
            Some(row_result) => {
                let json_str = row_result.context("failed to read state row")?;
                let value: serde_json::Value = serde_json::from_str(&json_str)
                    .context("failed to deserialize state value")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Return the number of picks recorded for the given `draft_id`.
    pub fn pick_count(&self, draft_id: &str) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM draft_picks WHERE draft_id = ?1",
                params![draft_id],
                |row| row.get(0),
            )
            .context("failed to count draft picks")?;
        Ok(count as usize)
    }

    /// Delete all picks and draft state, resetting to a clean slate. Runs in
    /// one transaction with automatic rollback on error.
    pub fn clear_draft(&self) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        tx.execute("DELETE FROM draft_picks", [])
            .context("failed to delete draft picks")?;
        tx.execute("DELETE FROM draft_state", [])
            .context("failed to delete draft state")?;
        tx.commit().context("failed to commit clear_draft")?;
        Ok(())
    }

    const DRAFT_ID_KEY: &'static str = "current_draft_id";

    /// Retrieve the stored draft ID. Returns `None` if none has been set.
    pub fn get_draft_id(&self) -> Result<Option<String>> {
        let value = self.load_state(Self::DRAFT_ID_KEY)?;
        Ok(value.and_then(|v| v.as_str().map(|s| s.to_string())))
    }

    pub fn set_draft_id(&self, draft_id: &str) -> Result<()> {
        self.save_state(
            Self::DRAFT_ID_KEY,
            &serde_json::Value::String(draft_id.to_string()),
        )
    }

    /// Fresh draft ID stamped with the current UTC time, millisecond
    /// resolution: `draft_20261017_090500_042`.
    pub fn generate_draft_id() -> String {
        let now = chrono::Utc::now();
        now.format("draft_%Y%m%d_%H%M%S_%3f").to_string()
    }

    /// Return the stored draft ID, generating and storing a fresh one when
    /// the database has none yet.
    pub fn current_or_new_draft_id(&self) -> Result<String> {
        if let Some(id) = self.get_draft_id()? {
            return Ok(id);
        }
        let id = Self::generate_draft_id();
        self.set_draft_id(&id)?;
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// PickLog adapter
// ---------------------------------------------------------------------------

/// Durable pick log scoped to one draft session.
#[derive(Clone)]
pub struct SqlitePickLog {
    db: Arc<Database>,
    draft_id: String,
}

impl SqlitePickLog {
    pub fn new(db: Arc<Database>, draft_id: impl Into<String>) -> Self {
        SqlitePickLog {
            db,
            draft_id: draft_id.into(),
        }
    }

    pub fn draft_id(&self) -> &str {
        &self.draft_id
    }

    /// Picks previously appended for this draft, in pick order.
    pub fn committed_picks(&self) -> Result<Vec<Pick>> {
        self.db.load_picks(&self.draft_id)
    }
}

#[async_trait]
impl PickLog for SqlitePickLog {
    async fn append_pick(&self, pick: &Pick) -> Result<()> {
        let db = Arc::clone(&self.db);
        let draft_id = self.draft_id.clone();
        let pick = pick.clone();
        tokio::task::spawn_blocking(move || db.record_pick(&pick, &draft_id))
            .await
            .context("pick log writer panicked")?
    }
}
