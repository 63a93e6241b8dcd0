//! WARDEN Core - Record Model
//!
//! Typed values, schema-backed records, queries, and the policy/audit
//! vocabulary shared by every other crate. No storage or policy logic
//! lives here.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub mod audit;
pub mod clock;
pub mod error;
pub mod field;
pub mod index;
pub mod names;
pub mod policy;
pub mod query;
pub mod record;
pub mod schema;
pub mod value;

pub use audit::Audit;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{
    CacheError, ConfigError, PolicyError, SchemaError, StorageError, ValueError, WardenError,
    WardenResult,
};
pub use field::Field;
pub use index::IndexEntry;
pub use policy::{ActionType, DecisionType, OperationResponse, PolicyResponse, ResponseType};
pub use query::{Query, QueryField, QueryRange, QueryResult};
pub use record::Record;
pub use schema::{
    validate_field_name, ByteStore, FieldDef, ModelBinding, ModelDefinition, ModelSchema,
    SchemaRegistry, SchemaRegistryBuilder, MODEL_KEY,
};
pub use value::{Blob, FromValue, Value, ValueKind};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Identifier using UUIDv7 for timestamp-sortable IDs.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 identifier.
pub fn new_instance_id() -> EntityId {
    Uuid::now_v7()
}

/// Hex-encoded SHA-256 digest of `content`, used for cache keys.
pub fn compute_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_digest_is_stable() {
        let a = compute_digest("user:id=42");
        let b = compute_digest("user:id=42");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, compute_digest("user:id=43"));
    }

    #[test]
    fn test_instance_ids_are_unique() {
        assert_ne!(new_instance_id(), new_instance_id());
    }
}
