//! Error types for Warden operations

use crate::ValueKind;
use thiserror::Error;

/// Assignment-time validation errors on a field or value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValueError {
    #[error("Invalid enum value for {field}: '{value}' is not a member of {enum_type}")]
    InvalidEnumValue {
        field: String,
        enum_type: String,
        value: String,
    },

    #[error("Invalid model for {field}: {model} is not a registered model")]
    InvalidModel { field: String, model: String },

    #[error("Model mismatch on {field}: expected {expected}, got {got}")]
    ModelMismatch {
        field: String,
        expected: String,
        got: String,
    },

    #[error("Type mismatch on {field}: expected {expected:?}, got {got:?}")]
    TypeMismatch {
        field: String,
        expected: ValueKind,
        got: ValueKind,
    },

    #[error("Invalid list element at {index} on {field}: expected {expected:?}, got {got:?}")]
    InvalidListElement {
        field: String,
        index: usize,
        expected: ValueKind,
        got: ValueKind,
    },

    #[error("Field not found: {model}.{field}")]
    FieldNotFound { model: String, field: String },

    #[error("Field name '{name}' is reserved")]
    ReservedFieldName { name: String },

    #[error("Field name must not be empty")]
    EmptyFieldName,

    #[error("Field {field} is immutable once populated")]
    ImmutableField { field: String },

    #[error("Byte store failure on {field}: {reason}")]
    ByteStore { field: String, reason: String },
}

/// Schema registry construction errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Duplicate model definition: {model}")]
    DuplicateModel { model: String },

    #[error("Model {model} inherits unknown model {parent}")]
    UnknownParent { model: String, parent: String },

    #[error("Inheritance cycle detected at {model}")]
    InheritanceCycle { model: String },

    #[error("Field {model}.{field} references unknown enum type {enum_type}")]
    UnknownEnumType {
        model: String,
        field: String,
        enum_type: String,
    },

    #[error("Field {model}.{field} is bound to unknown model {target}")]
    UnknownFieldModel {
        model: String,
        field: String,
        target: String,
    },

    #[error("Field {model}.{field} of kind {kind:?} cannot be an identity field")]
    InvalidIdentityField {
        model: String,
        field: String,
        kind: ValueKind,
    },

    #[error("Invalid field definition on {model}: {source}")]
    InvalidField {
        model: String,
        #[source]
        source: ValueError,
    },
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Record not found: {model} {key}")]
    NotFound { model: String, key: String },

    #[error("Read failed for {model}: {reason}")]
    ReadFailed { model: String, reason: String },

    #[error("Write failed for {model}: {reason}")]
    WriteFailed { model: String, reason: String },

    #[error("Delete failed for {model}: {reason}")]
    DeleteFailed { model: String, reason: String },

    #[error("Search failed for {model}: {reason}")]
    SearchFailed { model: String, reason: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Storage unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Cache layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache admission rejected: result model {result_model} does not match query model {query_model}")]
    AdmissionRejected {
        query_model: String,
        result_model: String,
    },
}

/// Policy evaluation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Token rejected: {reason}")]
    TokenRejected { reason: String },

    #[error("Missing collaborator: {name}")]
    MissingCollaborator { name: String },

    #[error("Unknown operation: {name}")]
    UnknownOperation { name: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Warden errors.
#[derive(Debug, Clone, Error)]
pub enum WardenError {
    #[error("Value error: {0}")]
    Value(#[from] ValueError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Warden operations.
pub type WardenResult<T> = Result<T, WardenError>;

// =============================================================================
// TESTS
// =============================================================================
