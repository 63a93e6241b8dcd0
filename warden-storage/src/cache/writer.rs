//! Writer decorator that broadcasts cache invalidation around every write.

use super::registry::CacheRegistry;
use crate::RecordWriter;
use std::sync::Arc;
use tracing::trace;
use warden_core::{IndexEntry, Record, WardenResult};

/// Invalidates every registered cache before and after each physical write.
///
/// Invalidation is by identity: each populated identity field's digest is
/// cleared by key, then the record itself is broadcast. Deletes also
/// broadcast an [`IndexEntry`]. Creates additionally clear the model's
/// buckets, since a new record can join any cached result set for its model.
pub struct InvalidatingWriter {
    inner: Arc<dyn RecordWriter>,
    registry: Arc<CacheRegistry>,
}

impl InvalidatingWriter {
    pub fn new(inner: Arc<dyn RecordWriter>, registry: Arc<CacheRegistry>) -> Self {
        Self { inner, registry }
    }

    fn invalidate(&self, record: &Record) {
        let digests = record.identity_digests();
        trace!(model = record.model(), keys = digests.len(), "Invalidating caches");
        for key in &digests {
            self.registry.clear_by_key(key);
        }
        self.registry.clear_by_record(record);
    }

    fn invalidate_models(&self, record: &Record) {
        for model in record.schema().ancestors() {
            self.registry.clear_by_model(model);
        }
    }
}

impl RecordWriter for InvalidatingWriter {
    fn create(&self, record: &mut Record) -> WardenResult<bool> {
        self.invalidate(record);
        let created = self.inner.create(record);
        self.invalidate(record);
        self.invalidate_models(record);
        created
    }

    fn update(&self, record: &Record) -> WardenResult<bool> {
        self.invalidate(record);
        let updated = self.inner.update(record);
        self.invalidate(record);
        updated
    }

    fn delete(&self, record: &Record) -> WardenResult<bool> {
        let entry = IndexEntry::from_record(record);
        self.invalidate(record);
        self.registry.clear_by_index(&entry);
        let deleted = self.inner.delete(record);
        self.invalidate(record);
        self.registry.clear_by_index(&entry);
        deleted
    }
}
