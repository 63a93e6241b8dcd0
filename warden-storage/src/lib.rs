//! WARDEN Storage - Storage Traits, In-Memory Backend, and Cache Layer
//!
//! Defines the reader/writer/search abstraction that every backend
//! implements, the hierarchical path resolver seam, an in-memory backend for
//! embedding and tests, and the cache decorators that sit between the access
//! point and a backend.

pub mod bytes;
pub mod cache;
pub mod memory;

pub use bytes::InMemoryByteStore;
pub use cache::{
    CacheConfig, CacheProvider, CacheRead, CacheRegistry, CacheStats, CachedReader, CachedSearch,
    InvalidatingWriter, ProviderId, Registration, TtlSweep,
};
pub use memory::InMemoryStore;

use std::fmt;
use std::sync::Arc;
use warden_core::names::{FIELD_ID, FIELD_OBJECT_ID, FIELD_URN};
use warden_core::{compute_digest, Query, QueryResult, Record, WardenResult};

// ============================================================================
// LOCATORS
// ============================================================================

/// How a point read addresses a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocatorKey {
    Id(i64),
    Urn(String),
    ObjectId(String),
    /// Hierarchical path, resolved by the backend.
    Path(String),
}

/// Address of a single record for point reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    pub model: String,
    pub key: LocatorKey,
}

impl Locator {
    pub fn by_id(model: impl Into<String>, id: i64) -> Self {
        Self {
            model: model.into(),
            key: LocatorKey::Id(id),
        }
    }

    pub fn by_urn(model: impl Into<String>, urn: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            key: LocatorKey::Urn(urn.into()),
        }
    }

    pub fn by_object_id(model: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            key: LocatorKey::ObjectId(object_id.into()),
        }
    }

    pub fn by_path(model: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            key: LocatorKey::Path(path.into()),
        }
    }

    /// Field the key addresses.
    pub fn field_name(&self) -> &'static str {
        match self.key {
            LocatorKey::Id(_) => FIELD_ID,
            LocatorKey::Urn(_) => FIELD_URN,
            LocatorKey::ObjectId(_) => FIELD_OBJECT_ID,
            LocatorKey::Path(_) => "path",
        }
    }

    /// Content digest of the locator.
    ///
    /// Equal to the matching entry of [`Record::identity_digests`] for id,
    /// urn and objectId locators, so writers can evict point reads by key.
    pub fn digest(&self) -> String {
        compute_digest(&self.to_string())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match &self.key {
            LocatorKey::Id(id) => id.to_string(),
            LocatorKey::Urn(s) | LocatorKey::ObjectId(s) | LocatorKey::Path(s) => s.clone(),
        };
        write!(f, "{}:{}={}", self.model, self.field_name(), value)
    }
}

// ============================================================================
// STORAGE TRAITS
// ============================================================================

/// Point reads by locator.
pub trait RecordReader: Send + Sync {
    fn read(&self, locator: &Locator) -> WardenResult<Option<Record>>;
}

/// Physical writes.
pub trait RecordWriter: Send + Sync {
    /// Persist a new record, assigning any generated identity fields in place.
    fn create(&self, record: &mut Record) -> WardenResult<bool>;

    /// Replace the stored record identity-equal to `record`.
    fn update(&self, record: &Record) -> WardenResult<bool>;

    fn delete(&self, record: &Record) -> WardenResult<bool>;

    /// Write each record, creating those without identity and updating the rest.
    ///
    /// Returns the number of records written.
    fn write_batch(&self, records: &mut [Record]) -> WardenResult<usize> {
        let mut written = 0;
        for record in records.iter_mut() {
            let ok = if record.is_identity_record() {
                self.update(record)?
            } else {
                self.create(record)?
            };
            if ok {
                written += 1;
            }
        }
        Ok(written)
    }
}

/// Query execution.
pub trait RecordSearch: Send + Sync {
    fn find(&self, query: &Query) -> WardenResult<QueryResult>;

    fn count(&self, query: &Query) -> WardenResult<u64> {
        Ok(self.find(query)?.total_count)
    }
}

/// Resolves records addressed by a hierarchical path such as `/home/alice/docs`.
///
/// `kind` narrows the lookup where a model has typed subtrees; `organization_id`
/// scopes the path root.
pub trait PathResolver: Send + Sync {
    fn find_path(
        &self,
        actor: &Record,
        model: &str,
        path: &str,
        kind: Option<&str>,
        organization_id: Option<i64>,
    ) -> WardenResult<Option<Record>>;

    /// Like [`find_path`](Self::find_path) but creates missing segments.
    fn make_path(
        &self,
        actor: &Record,
        model: &str,
        path: &str,
        kind: Option<&str>,
        organization_id: Option<i64>,
    ) -> WardenResult<Option<Record>>;
}

impl<T: RecordReader + ?Sized> RecordReader for Arc<T> {
    fn read(&self, locator: &Locator) -> WardenResult<Option<Record>> {
        (**self).read(locator)
    }
}

impl<T: RecordWriter + ?Sized> RecordWriter for Arc<T> {
    fn create(&self, record: &mut Record) -> WardenResult<bool> {
        (**self).create(record)
    }

    fn update(&self, record: &Record) -> WardenResult<bool> {
        (**self).update(record)
    }

    fn delete(&self, record: &Record) -> WardenResult<bool> {
        (**self).delete(record)
    }

    fn write_batch(&self, records: &mut [Record]) -> WardenResult<usize> {
        (**self).write_batch(records)
    }
}

impl<T: RecordSearch + ?Sized> RecordSearch for Arc<T> {
    fn find(&self, query: &Query) -> WardenResult<QueryResult> {
        (**self).find(query)
    }

    fn count(&self, query: &Query) -> WardenResult<u64> {
        (**self).count(query)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{FieldDef, ModelDefinition, SchemaRegistry, ValueKind};

    #[test]
    fn test_locator_digest_matches_identity_digest() {
        let reg = SchemaRegistry::builder()
            .model(
                ModelDefinition::new("user")
                    .field(FieldDef::new("id", ValueKind::Long).identity())
                    .field(FieldDef::new("urn", ValueKind::String).identity()),
            )
            .build()
            .unwrap();
        let mut user = reg.new_record("user").unwrap();
        user.set("id", 42i64).unwrap();
        user.set("urn", "urn:user:42").unwrap();

        let digests = user.identity_digests();
        assert!(digests.contains(&Locator::by_id("user", 42).digest()));
        assert!(digests.contains(&Locator::by_urn("user", "urn:user:42").digest()));
        assert!(!digests.contains(&Locator::by_id("group", 42).digest()));
    }

    #[test]
    fn test_locator_display() {
        assert_eq!(Locator::by_id("user", 7).to_string(), "user:id=7");
        assert_eq!(
            Locator::by_path("group", "/home/alice").to_string(),
            "group:path=/home/alice"
        );
    }
}
