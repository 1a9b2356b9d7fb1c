//! Volatile cooldown store. Reset on process restart.

use super::{CooldownResult, CooldownStore};
use crate::model::plan::ReminderKey;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct InMemoryCooldownStore {
    entries: HashMap<ReminderKey, i64>,
}

impl InMemoryCooldownStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CooldownStore for InMemoryCooldownStore {
    fn get(&self, key: &ReminderKey) -> CooldownResult<Option<i64>> {
        Ok(self.entries.get(key).copied())
    }

    fn set(&mut self, key: &ReminderKey, notified_at_ms: i64) -> CooldownResult<()> {
        self.entries.insert(key.clone(), notified_at_ms);
        Ok(())
    }

    fn clear(&mut self, key: &ReminderKey) -> CooldownResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}
