//! Schema-backed records.
//!
//! A [`Record`] is an ordered set of [`Field`]s instantiated from a
//! [`ModelSchema`]. It tracks whether it has been populated from storage
//! and to what foreign-key depth, so that a shallow record can later be
//! re-hydrated without losing fields the caller already set.

use crate::error::ValueError;
use crate::field::Field;
use crate::schema::{validate_field_name, ModelSchema, SchemaRegistry, MODEL_KEY};
use crate::value::{Blob, FromValue};
use crate::{compute_digest, Value};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct Record {
    schema: Arc<ModelSchema>,
    registry: Arc<SchemaRegistry>,
    fields: Vec<Field>,
    populated: bool,
    depth: u8,
    /// Stable per-instance id used to address out-of-line blobs.
    instance: Uuid,
}

impl Record {
    pub(crate) fn instantiate(registry: Arc<SchemaRegistry>, schema: Arc<ModelSchema>) -> Self {
        let fields = schema.fields().iter().cloned().map(Field::new).collect();
        Self {
            schema,
            registry,
            fields,
            populated: false,
            depth: 0,
            instance: crate::new_instance_id(),
        }
    }

    pub fn model(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.field(name).map(Field::value)
    }

    /// True if `model` is this record's model or one of its ancestors.
    pub fn inherits(&self, model: &str) -> bool {
        self.schema.inherits(model)
    }

    pub fn is_populated(&self) -> bool {
        self.populated
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance
    }

    /// Assign a field value.
    ///
    /// Byte payloads on a model that declares the byte-store capability are
    /// written out to the registry's byte store and replaced by a locator.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ValueError> {
        validate_field_name(name)?;
        let index = self.index_of(name)?;
        let value = value.into();

        let value = match value {
            Value::Blob(Blob::Inline(bytes)) if self.schema.has_byte_store() => {
                let kind = self.fields[index].kind();
                if kind != crate::ValueKind::Blob {
                    return Err(ValueError::TypeMismatch {
                        field: name.to_string(),
                        expected: kind,
                        got: crate::ValueKind::Blob,
                    });
                }
                let field = &self.fields[index];
                if field.is_immutable() && field.is_populated() {
                    if self.get_bytes(name)? == bytes {
                        return Ok(());
                    }
                    return Err(ValueError::ImmutableField {
                        field: name.to_string(),
                    });
                }
                Value::Blob(self.store_bytes(name, &bytes)?)
            }
            other => other,
        };

        let registry = Arc::clone(&self.registry);
        self.fields[index].set(value, &registry)
    }

    /// Read a field as `T`. No coercion is performed.
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T, ValueError> {
        let index = self.index_of(name)?;
        let value = self.fields[index].value();
        let resolved;
        let value = match value {
            Value::Blob(Blob::Stored { .. }) => {
                resolved = Value::Blob(Blob::Inline(self.get_bytes(name)?));
                &resolved
            }
            other => other,
        };
        T::from_value(value).ok_or_else(|| ValueError::TypeMismatch {
            field: name.to_string(),
            expected: T::KIND,
            got: value.kind(),
        })
    }

    /// Read a byte field, following a byte-store locator when present.
    pub fn get_bytes(&self, name: &str) -> Result<Vec<u8>, ValueError> {
        let index = self.index_of(name)?;
        match self.fields[index].value() {
            Value::Blob(Blob::Inline(bytes)) => Ok(bytes.clone()),
            Value::Blob(Blob::Stored { locator, .. }) => {
                let store = self.registry.byte_store().ok_or_else(|| ValueError::ByteStore {
                    field: name.to_string(),
                    reason: "no byte store configured".to_string(),
                })?;
                store
                    .get(locator)
                    .map_err(|e| ValueError::ByteStore {
                        field: name.to_string(),
                        reason: e.to_string(),
                    })?
                    .ok_or_else(|| ValueError::ByteStore {
                        field: name.to_string(),
                        reason: format!("no bytes at {}", locator),
                    })
            }
            other => Err(ValueError::TypeMismatch {
                field: name.to_string(),
                expected: crate::ValueKind::Blob,
                got: other.kind(),
            }),
        }
    }

    /// Populated identity fields, in schema order.
    pub fn identity_values(&self) -> Vec<(&str, &Value)> {
        self.fields
            .iter()
            .filter(|f| f.is_identity() && f.is_populated())
            .map(|f| (f.name(), f.value()))
            .collect()
    }

    /// Whether any identity field is populated.
    pub fn is_identity_record(&self) -> bool {
        self.fields
            .iter()
            .any(|f| f.is_identity() && f.is_populated())
    }

    /// Identity equality: same model, and every identity field populated on
    /// both sides agrees. At least one such shared field must exist.
    pub fn identity_matches(&self, other: &Record) -> bool {
        if self.model() != other.model() {
            return false;
        }
        let mut shared = 0;
        for field in self.fields.iter().filter(|f| f.is_identity() && f.is_populated()) {
            if let Some(theirs) = other.field(field.name()).filter(|f| f.is_populated()) {
                if theirs.value() != field.value() {
                    return false;
                }
                shared += 1;
            }
        }
        shared > 0
    }

    /// Canonical key for the first populated identity field, e.g. `user:id=42`.
    pub fn identity_key(&self) -> Option<String> {
        self.identity_values()
            .first()
            .map(|(name, value)| format!("{}:{}={}", self.model(), name, value.canonical_string()))
    }

    /// Stable reference for logs, audits, and decision caching.
    ///
    /// The urn when populated, else the first identity key, else a per-instance key.
    pub fn reference_key(&self) -> String {
        if let Some(Value::String(urn)) = self.value(crate::names::FIELD_URN) {
            if !urn.is_empty() {
                return urn.clone();
            }
        }
        self.identity_key()
            .unwrap_or_else(|| format!("{}#{}", self.model(), self.instance))
    }

    /// Digests of every populated identity field's key.
    pub fn identity_digests(&self) -> Vec<String> {
        self.identity_values()
            .into_iter()
            .map(|(name, value)| {
                compute_digest(&format!(
                    "{}:{}={}",
                    self.model(),
                    name,
                    value.canonical_string()
                ))
            })
            .collect()
    }

    /// Partial copy: a new record of the same model carrying only `names`.
    pub fn copy_fields(&self, names: &[&str]) -> Record {
        let mut copy = Record::instantiate(Arc::clone(&self.registry), Arc::clone(&self.schema));
        for (theirs, ours) in copy.fields.iter_mut().zip(self.fields.iter()) {
            if names.contains(&ours.name()) {
                *theirs = ours.clone();
            }
        }
        copy.instance = self.instance;
        copy.populated = self.populated;
        copy.depth = self.depth;
        copy
    }

    pub fn mark_populated(&mut self, depth: u8) {
        self.populated = true;
        self.depth = self.depth.max(depth);
    }

    /// Merge fields from a deeper read of the same instance.
    ///
    /// Fields already populated here are kept; unpopulated ones take `other`'s value.
    pub fn hydrate(&mut self, other: &Record, depth: u8) -> Result<(), ValueError> {
        if other.model() != self.model() {
            return Err(ValueError::ModelMismatch {
                field: MODEL_KEY.to_string(),
                expected: self.model().to_string(),
                got: other.model().to_string(),
            });
        }
        for (ours, theirs) in self.fields.iter_mut().zip(other.fields.iter()) {
            if !ours.is_populated() && theirs.is_populated() {
                *ours = theirs.clone();
            }
        }
        self.mark_populated(depth);
        Ok(())
    }

    fn index_of(&self, name: &str) -> Result<usize, ValueError> {
        self.fields
            .iter()
            .position(|f| f.name() == name)
            .ok_or_else(|| ValueError::FieldNotFound {
                model: self.model().to_string(),
                field: name.to_string(),
            })
    }

    fn store_bytes(&self, name: &str, bytes: &[u8]) -> Result<Blob, ValueError> {
        let store = self.registry.byte_store().ok_or_else(|| ValueError::ByteStore {
            field: name.to_string(),
            reason: "no byte store configured".to_string(),
        })?;
        let locator = format!("{}/{}/{}", self.model(), self.instance, name);
        store.put(&locator, bytes).map_err(|e| ValueError::ByteStore {
            field: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Blob::Stored {
            locator,
            len: bytes.len(),
        })
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.model() == other.model() && self.fields == other.fields
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        map.entry(&MODEL_KEY, &self.model());
        for field in self.fields.iter().filter(|f| f.is_populated()) {
            map.entry(&field.name(), field.value());
        }
        map.finish()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry(MODEL_KEY, self.model())?;
        for field in &self.fields {
            map.serialize_entry(field.name(), field.value())?;
        }
        map.end()
    }
}

// =============================================================================
// TESTS
// =============================================================================
