//! Episode Journal.
//!
//! Archives every episode an agent observes to a local SQLite database so a
//! run can be inspected offline.  The journal is write-through only: learned
//! models are never rebuilt from it when an agent starts.
//!
//! # Storage layout
//!
//! | column      | type    | description                                 |
//! |-------------|---------|---------------------------------------------|
//! | agent_id    | TEXT    | Owning agent                                |
//! | now         | INTEGER | Episode ordinal                             |
//! | observed_at | TEXT    | RFC-3339 observation time (UTC)             |
//! | cmd         | INTEGER | Command code issued                         |
//! | sensors     | TEXT    | JSON array of tagged sensor values          |
//!
//! `(agent_id, now)` is the primary key, so several agents may share a file.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use strider_types::{Command, Episode, SensorValue};
use thiserror::Error;

/// Errors that can arise from journal operations.
#[derive(Error, Debug)]
pub enum JournalError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Sensor encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Corrupt journal row: {0}")]
    Corrupt(String),
}

/// SQLite-backed archive of observed episodes.
pub struct EpisodeJournal {
    conn: Connection,
}

impl EpisodeJournal {
    /// Open (or create) a journal at `path`.
    pub fn open(path: &str) -> Result<Self, JournalError> {
        let conn = Connection::open(path)?;
        let journal = Self { conn };
        journal.init_schema()?;
        Ok(journal)
    }

    /// Open a temporary in-memory journal.
    pub fn open_in_memory() -> Result<Self, JournalError> {
        let conn = Connection::open_in_memory()?;
        let journal = Self { conn };
        journal.init_schema()?;
        Ok(journal)
    }

    fn init_schema(&self) -> Result<(), JournalError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS episodes (
                agent_id    TEXT    NOT NULL,
                now         INTEGER NOT NULL,
                observed_at TEXT    NOT NULL,
                cmd         INTEGER NOT NULL,
                sensors     TEXT    NOT NULL,
                PRIMARY KEY (agent_id, now)
            );",
        )?;
        Ok(())
    }

    /// Archive one episode for `agent_id`.
    pub fn append(&self, agent_id: &str, episode: &Episode) -> Result<(), JournalError> {
        let sensors = serde_json::to_string(&episode.sensors)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO episodes (agent_id, now, observed_at, cmd, sensors)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                agent_id,
                episode.now as i64,
                episode.observed_at.to_rfc3339(),
                episode.cmd.code(),
                sensors,
            ],
        )?;
        Ok(())
    }

    /// All episodes archived for `agent_id`, in ordinal order.
    pub fn episodes(&self, agent_id: &str) -> Result<Vec<Episode>, JournalError> {
        let mut stmt = self.conn.prepare(
            "SELECT now, observed_at, cmd, sensors
             FROM episodes
             WHERE agent_id = ?1
             ORDER BY now ASC",
        )?;
        let rows = stmt.query_map(params![agent_id], |row| {
            let now: i64 = row.get(0)?;
            let observed_at: String = row.get(1)?;
            let cmd: i32 = row.get(2)?;
            let sensors: String = row.get(3)?;
            Ok((now, observed_at, cmd, sensors))
        })?;

        let mut episodes = Vec::new();
        for row in rows {
            let (now, observed_at, cmd, sensors) = row?;
            let observed_at = observed_at
                .parse::<DateTime<Utc>>()
                .map_err(|e| JournalError::Corrupt(format!("timestamp: {e}")))?;
            let cmd = Command::from_code(cmd)
                .ok_or_else(|| JournalError::Corrupt(format!("unknown command code {cmd}")))?;
            let sensors: Vec<SensorValue> = serde_json::from_str(&sensors)?;
            episodes.push(Episode {
                sensors,
                cmd,
                now: now as usize,
                observed_at,
            });
        }
        Ok(episodes)
    }

    /// Number of episodes archived for `agent_id`.
    pub fn count(&self, agent_id: &str) -> Result<usize, JournalError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM episodes WHERE agent_id = ?1",
            params![agent_id],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}
