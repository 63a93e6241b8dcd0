//! In-memory backend implementing reader, writer, and search.

use crate::{Locator, LocatorKey, RecordReader, RecordSearch, RecordWriter};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use warden_core::names::{FIELD_ID, FIELD_OBJECT_ID, FIELD_ORGANIZATION_ID};
use warden_core::{Query, QueryResult, Record, StorageError, Value, WardenResult};

/// In-memory record store, bucketed by model.
///
/// Assigns `id` (sequential, from 1) and `objectId` (UUIDv7) on create when
/// the model declares those fields and the caller left them unset.
#[derive(Debug)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, Vec<Record>>>,
    next_id: AtomicI64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records of `model`.
    pub fn len(&self, model: &str) -> WardenResult<usize> {
        Ok(self.read_lock()?.get(model).map_or(0, Vec::len))
    }

    pub fn is_empty(&self) -> WardenResult<bool> {
        Ok(self.read_lock()?.values().all(Vec::is_empty))
    }

    pub fn clear(&self) -> WardenResult<()> {
        self.write_lock()?.clear();
        Ok(())
    }

    fn read_lock(&self) -> WardenResult<RwLockReadGuard<'_, HashMap<String, Vec<Record>>>> {
        self.records
            .read()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    fn write_lock(&self) -> WardenResult<RwLockWriteGuard<'_, HashMap<String, Vec<Record>>>> {
        self.records
            .write()
            .map_err(|_| StorageError::LockPoisoned.into())
    }
}

impl RecordReader for InMemoryStore {
    fn read(&self, locator: &Locator) -> WardenResult<Option<Record>> {
        let wanted = match &locator.key {
            LocatorKey::Id(id) => Value::Long(*id),
            LocatorKey::Urn(s) | LocatorKey::ObjectId(s) => Value::String(s.clone()),
            LocatorKey::Path(_) => return Ok(None),
        };
        let field = locator.field_name();
        let records = self.read_lock()?;
        Ok(records.get(&locator.model).and_then(|bucket| {
            bucket
                .iter()
                .find(|r| r.value(field).is_some_and(|v| values_match(v, &wanted)))
                .cloned()
        }))
    }
}

impl RecordWriter for InMemoryStore {
    fn create(&self, record: &mut Record) -> WardenResult<bool> {
        let mut records = self.write_lock()?;
        let bucket = records.entry(record.model().to_string()).or_default();
        if record.is_identity_record() && bucket.iter().any(|r| r.identity_matches(record)) {
            return Err(StorageError::WriteFailed {
                model: record.model().to_string(),
                reason: "record already exists".to_string(),
            }
            .into());
        }

        if record.field(FIELD_ID).is_some_and(|f| !f.is_populated()) {
            record.set(FIELD_ID, self.next_id.fetch_add(1, Ordering::SeqCst))?;
        }
        if record.field(FIELD_OBJECT_ID).is_some_and(|f| !f.is_populated()) {
            record.set(FIELD_OBJECT_ID, warden_core::new_instance_id().to_string())?;
        }
        record.mark_populated(record.depth());
        bucket.push(record.clone());
        Ok(true)
    }

    fn update(&self, record: &Record) -> WardenResult<bool> {
        let mut records = self.write_lock()?;
        let Some(bucket) = records.get_mut(record.model()) else {
            return Ok(false);
        };
        match bucket.iter_mut().find(|r| r.identity_matches(record)) {
            Some(stored) => {
                let mut updated = record.clone();
                updated.mark_populated(record.depth());
                *stored = updated;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete(&self, record: &Record) -> WardenResult<bool> {
        let mut records = self.write_lock()?;
        let Some(bucket) = records.get_mut(record.model()) else {
            return Ok(false);
        };
        let before = bucket.len();
        bucket.retain(|r| !r.identity_matches(record));
        Ok(bucket.len() != before)
    }
}

impl RecordSearch for InMemoryStore {
    fn find(&self, query: &Query) -> WardenResult<QueryResult> {
        let records = self.read_lock()?;
        let matches: Vec<&Record> = records
            .get(&query.model)
            .map(|bucket| bucket.iter().filter(|r| matches_query(r, query)).collect())
            .unwrap_or_default();

        let total_count = matches.len() as u64;
        let (start, count) = query
            .range
            .map(|r| (r.start as usize, r.count as usize))
            .unwrap_or((0, usize::MAX));
        let projection: Vec<&str> = query.projection.iter().map(String::as_str).collect();

        let rows = matches
            .into_iter()
            .skip(start)
            .take(count)
            .map(|r| {
                if projection.is_empty() {
                    r.clone()
                } else {
                    r.copy_fields(&with_identity(r, &projection))
                }
            })
            .collect();

        Ok(QueryResult::paged(query.clone(), rows, total_count))
    }

    fn count(&self, query: &Query) -> WardenResult<u64> {
        let records = self.read_lock()?;
        Ok(records
            .get(&query.model)
            .map_or(0, |bucket| bucket.iter().filter(|r| matches_query(r, query)).count()) as u64)
    }
}

/// Projected rows always carry the model's identity fields so cached results
/// stay addressable for invalidation.
fn with_identity<'a>(record: &'a Record, projection: &[&'a str]) -> Vec<&'a str> {
    let mut names = projection.to_vec();
    for field in record.fields().iter().filter(|f| f.is_identity()) {
        if !names.contains(&field.name()) {
            names.push(field.name());
        }
    }
    names
}

fn matches_query(record: &Record, query: &Query) -> bool {
    let constrained = query.fields.iter().all(|qf| {
        record
            .value(&qf.name)
            .is_some_and(|v| values_match(v, &qf.value))
    });
    let in_scope = match query.org_scope {
        Some(org) if record.has_field(FIELD_ORGANIZATION_ID) => {
            record.value(FIELD_ORGANIZATION_ID) == Some(&Value::Long(org))
        }
        _ => true,
    };
    constrained && in_scope
}

/// Equality, treating an enum member and a plain string with the same text as equal.
fn values_match(stored: &Value, wanted: &Value) -> bool {
    match (stored, wanted) {
        (Value::Enum(a), Value::String(b)) | (Value::String(a), Value::Enum(b)) => a == b,
        (a, b) => a == b,
    }
}

// ============================================================================
// TESTS
// ============================================================================
