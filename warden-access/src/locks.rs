//! Field locks: fields that may not be modified or deleted while locked.

use dashmap::DashMap;
use warden_core::Record;

pub trait FieldLockProvider: Send + Sync {
    /// Names of the locked fields of `record` as seen by `actor`.
    fn locked_fields(&self, actor: &Record, record: &Record) -> Vec<String>;

    /// True if any field the record declares is locked.
    fn is_locked(&self, actor: &Record, record: &Record) -> bool {
        let locked = self.locked_fields(actor, record);
        !locked.is_empty() && record.fields().iter().any(|f| locked.iter().any(|l| l == f.name()))
    }
}

/// Locks held in memory, keyed by record reference.
#[derive(Debug, Default)]
pub struct StaticFieldLocks {
    locks: DashMap<String, Vec<String>>,
}

impl StaticFieldLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self, record: &Record, field: impl Into<String>) {
        let field = field.into();
        let mut entry = self.locks.entry(record.reference_key()).or_default();
        if !entry.contains(&field) {
            entry.push(field);
        }
    }

    /// Returns true if the lock existed.
    pub fn unlock(&self, record: &Record, field: &str) -> bool {
        let key = record.reference_key();
        let Some(mut entry) = self.locks.get_mut(&key) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|f| f != field);
        let removed = entry.len() != before;
        let empty = entry.is_empty();
        drop(entry);
        if empty {
            self.locks.remove(&key);
        }
        removed
    }
}

impl FieldLockProvider for StaticFieldLocks {
    fn locked_fields(&self, _actor: &Record, record: &Record) -> Vec<String> {
        self.locks
            .get(&record.reference_key())
            .map(|l| l.value().clone())
            .unwrap_or_default()
    }
}
