//! Tagged value payloads carried by record fields.

use crate::Record;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Discriminator for the fixed set of value variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Boolean,
    Int,
    Long,
    Double,
    String,
    Enum,
    Timestamp,
    ZonedTime,
    Blob,
    Vector,
    List,
    Model,
}

/// Byte payload, either held inline or redirected to an out-of-line byte store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Blob {
    Inline(Vec<u8>),
    /// Bytes live in the schema's byte store under `locator`.
    Stored { locator: String, len: usize },
}

impl Blob {
    pub fn len(&self) -> usize {
        match self {
            Blob::Inline(bytes) => bytes.len(),
            Blob::Stored { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single typed payload. The variant always matches the owning field's kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Boolean(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    /// Member name of the field's bound enum type.
    Enum(String),
    Timestamp(DateTime<Utc>),
    ZonedTime(DateTime<FixedOffset>),
    Blob(Blob),
    Vector(Vec<f32>),
    List(Vec<Value>),
    Model(Option<Box<Record>>),
}

impl Value {
    /// Get the kind tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Int(_) => ValueKind::Int,
            Value::Long(_) => ValueKind::Long,
            Value::Double(_) => ValueKind::Double,
            Value::String(_) => ValueKind::String,
            Value::Enum(_) => ValueKind::Enum,
            Value::Timestamp(_) => ValueKind::Timestamp,
            Value::ZonedTime(_) => ValueKind::ZonedTime,
            Value::Blob(_) => ValueKind::Blob,
            Value::Vector(_) => ValueKind::Vector,
            Value::List(_) => ValueKind::List,
            Value::Model(_) => ValueKind::Model,
        }
    }

    /// The unset value for a kind, used when a record is first instantiated.
    pub fn default_for(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Boolean => Value::Boolean(false),
            ValueKind::Int => Value::Int(0),
            ValueKind::Long => Value::Long(0),
            ValueKind::Double => Value::Double(0.0),
            ValueKind::String => Value::String(String::new()),
            ValueKind::Enum => Value::Enum(String::new()),
            ValueKind::Timestamp => Value::Timestamp(DateTime::<Utc>::default()),
            ValueKind::ZonedTime => Value::ZonedTime(DateTime::<FixedOffset>::default()),
            ValueKind::Blob => Value::Blob(Blob::Inline(Vec::new())),
            ValueKind::Vector => Value::Vector(Vec::new()),
            ValueKind::List => Value::List(Vec::new()),
            ValueKind::Model => Value::Model(None),
        }
    }

    /// Whether the value carries something other than its kind's unset default.
    ///
    /// Booleans are always considered populated.
    pub fn is_populated(&self) -> bool {
        match self {
            Value::Boolean(_) => true,
            Value::Int(v) => *v != 0,
            Value::Long(v) => *v != 0,
            Value::Double(v) => *v != 0.0,
            Value::String(s) | Value::Enum(s) => !s.is_empty(),
            Value::Timestamp(t) => *t != DateTime::<Utc>::default(),
            Value::ZonedTime(t) => *t != DateTime::<FixedOffset>::default(),
            Value::Blob(b) => !b.is_empty(),
            Value::Vector(v) => !v.is_empty(),
            Value::List(v) => !v.is_empty(),
            Value::Model(m) => m.is_some(),
        }
    }

    /// Extract a typed payload. Returns `None` when the variant does not match `T`.
    pub fn get<T: FromValue>(&self) -> Option<T> {
        T::from_value(self)
    }

    /// Stable textual form used when building identity keys and locators.
    pub fn canonical_string(&self) -> String {
        match self {
            Value::Boolean(b) => b.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Long(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::String(s) | Value::Enum(s) => s.clone(),
            Value::Timestamp(t) => t.to_rfc3339(),
            Value::ZonedTime(t) => t.to_rfc3339(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }
}

/// Conversion out of a [`Value`] without coercion.
pub trait FromValue: Sized {
    /// Kind this type is read from.
    const KIND: ValueKind;

    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! scalar_value {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        }

        impl FromValue for $ty {
            const KIND: ValueKind = ValueKind::$variant;

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

scalar_value!(bool, Boolean);
scalar_value!(i32, Int);
scalar_value!(i64, Long);
scalar_value!(f64, Double);
scalar_value!(DateTime<Utc>, Timestamp);
scalar_value!(DateTime<FixedOffset>, ZonedTime);
scalar_value!(Vec<f32>, Vector);
scalar_value!(Vec<Value>, List);

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

/// Enum members and plain strings both read back as `String`.
impl FromValue for String {
    const KIND: ValueKind = ValueKind::String;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) | Value::Enum(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(Blob::Inline(v))
    }
}

/// Only inline blobs can be read without a byte store; see `Record::get_bytes`.
impl FromValue for Vec<u8> {
    const KIND: ValueKind = ValueKind::Blob;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Blob(Blob::Inline(bytes)) => Some(bytes.clone()),
            _ => None,
        }
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::List(v.into_iter().map(Value::String).collect())
    }
}

impl FromValue for Vec<String> {
    const KIND: ValueKind = ValueKind::List;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::List(items) => items.iter().map(String::from_value).collect(),
            _ => None,
        }
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Model(Some(Box::new(v)))
    }
}

impl From<Option<Record>> for Value {
    fn from(v: Option<Record>) -> Self {
        Value::Model(v.map(Box::new))
    }
}

impl FromValue for Record {
    const KIND: ValueKind = ValueKind::Model;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Model(Some(rec)) => Some((**rec).clone()),
            _ => None,
        }
    }
}

impl FromValue for Option<Record> {
    const KIND: ValueKind = ValueKind::Model;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Model(rec) => Some(rec.as_deref().cloned()),
            _ => None,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
