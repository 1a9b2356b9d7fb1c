//! Per-item cooldown persistence.
//!
//! # Responsibility
//! - Define the `CooldownStore` contract consumed by the evaluator.
//! - Provide volatile (memory) and durable (SQLite) implementations.
//!
//! # Invariants
//! - Entries never expire on their own; age is compared at evaluation time.
//! - A store is owned by exactly one evaluator and mutated only from inside
//!   an evaluation pass.
//!
//! # See also
//! - `crate::reminder::evaluator`

use crate::db::DbError;
use crate::model::plan::ReminderKey;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod memory;
mod sqlite_store;

pub use memory::InMemoryCooldownStore;
pub use sqlite_store::SqliteCooldownStore;

pub type CooldownResult<T> = Result<T, CooldownError>;

/// Cooldown store failures. All of them are recoverable.
#[derive(Debug)]
pub enum CooldownError {
    /// Store cannot be reached right now (locked, disconnected, closed).
    Unavailable(String),
    Db(DbError),
    InvalidData(String),
}

impl Display for CooldownError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "cooldown store unavailable: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted cooldown data: {message}"),
        }
    }
}

impl Error for CooldownError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Unavailable(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for CooldownError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for CooldownError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Key/value store mapping a reminder key to its last-notified instant
/// (Unix epoch milliseconds).
pub trait CooldownStore {
    fn get(&self, key: &ReminderKey) -> CooldownResult<Option<i64>>;
    fn set(&mut self, key: &ReminderKey, notified_at_ms: i64) -> CooldownResult<()>;
    /// Removes one entry. Removing a missing entry is not an error.
    fn clear(&mut self, key: &ReminderKey) -> CooldownResult<()>;
}

impl<S: CooldownStore + ?Sized> CooldownStore for Box<S> {
    fn get(&self, key: &ReminderKey) -> CooldownResult<Option<i64>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &ReminderKey, notified_at_ms: i64) -> CooldownResult<()> {
        (**self).set(key, notified_at_ms)
    }

    fn clear(&mut self, key: &ReminderKey) -> CooldownResult<()> {
        (**self).clear(key)
    }
}
