//! Durable cooldown store backed by SQLite.
//!
//! # Responsibility
//! - Persist last-notified instants across process restarts.
//! - Keep SQL details inside the cooldown persistence boundary.
//!
//! # Invariants
//! - One row per `(plan_id, item_id)` pair; `set` is an upsert.
//! - Busy/locked database conditions surface as `CooldownError::Unavailable`
//!   so the evaluator can enter degraded mode instead of failing.

use super::{CooldownError, CooldownResult, CooldownStore};
use crate::db::{open_db, open_db_in_memory};
use crate::model::plan::ReminderKey;
use rusqlite::{params, Connection, ErrorCode};
use std::path::Path;

/// SQLite-backed cooldown store owning its connection.
pub struct SqliteCooldownStore {
    conn: Connection,
}

impl SqliteCooldownStore {
    /// Opens (or creates) a cooldown database file.
    pub fn open(path: impl AsRef<Path>) -> CooldownResult<Self> {
        Self::try_new(open_db(path)?)
    }

    /// Opens a volatile SQLite-backed store; mostly useful for tests.
    pub fn open_in_memory() -> CooldownResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }

    /// Wraps an already migrated connection.
    ///
    /// # Errors
    /// - Returns `InvalidData` when the cooldown table is missing, which means
    ///   the connection did not go through `db::open_db`.
    pub fn try_new(conn: Connection) -> CooldownResult<Self> {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM sqlite_master
                WHERE type = 'table' AND name = 'reminder_cooldowns'
            );",
            [],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(CooldownError::InvalidData(
                "reminder_cooldowns table is missing; open the database with db::open_db"
                    .to_string(),
            ));
        }
        Ok(Self { conn })
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> CooldownResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM reminder_cooldowns;", [], |row| {
                row.get(0)
            })
            .map_err(map_sqlite_error)?;
        usize::try_from(count)
            .map_err(|_| CooldownError::InvalidData(format!("negative row count `{count}`")))
    }

    pub fn is_empty(&self) -> CooldownResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Deletes entries last notified before `cutoff_ms`.
    ///
    /// Entries older than the cooldown window no longer suppress anything, so
    /// hosts may call this occasionally to keep the file small.
    pub fn prune_older_than(&mut self, cutoff_ms: i64) -> CooldownResult<usize> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM reminder_cooldowns WHERE last_notified_ms < ?1;",
                [cutoff_ms],
            )
            .map_err(map_sqlite_error)?;
        Ok(removed)
    }
}

impl CooldownStore for SqliteCooldownStore {
    fn get(&self, key: &ReminderKey) -> CooldownResult<Option<i64>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT last_notified_ms
                 FROM reminder_cooldowns
                 WHERE plan_id = ?1 AND item_id = ?2;",
            )
            .map_err(map_sqlite_error)?;
        let mut rows = stmt
            .query(params![key.plan_id.as_str(), key.item_id.as_str()])
            .map_err(map_sqlite_error)?;
        match rows.next().map_err(map_sqlite_error)? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn set(&mut self, key: &ReminderKey, notified_at_ms: i64) -> CooldownResult<()> {
        self.conn
            .execute(
                "INSERT INTO reminder_cooldowns (plan_id, item_id, last_notified_ms)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(plan_id, item_id) DO UPDATE SET
                    last_notified_ms = excluded.last_notified_ms,
                    updated_at = (strftime('%s', 'now') * 1000);",
                params![
                    key.plan_id.as_str(),
                    key.item_id.as_str(),
                    notified_at_ms,
                ],
            )
            .map_err(map_sqlite_error)?;
        Ok(())
    }

    fn clear(&mut self, key: &ReminderKey) -> CooldownResult<()> {
        self.conn
            .execute(
                "DELETE FROM reminder_cooldowns WHERE plan_id = ?1 AND item_id = ?2;",
                params![key.plan_id.as_str(), key.item_id.as_str()],
            )
            .map_err(map_sqlite_error)?;
        Ok(())
    }
}

fn map_sqlite_error(err: rusqlite::Error) -> CooldownError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            CooldownError::Unavailable(err.to_string())
        }
        _ => CooldownError::from(err),
    }
}
