//! WARDEN Access - Policy-Gated Access Point
//!
//! The single surface through which callers create, modify, delete, find,
//! list and count records. Every call:
//! - opens exactly one audit and closes it on every exit path
//! - asks the authorization provider before touching storage
//! - scopes searches to the calling actor and their organization
//!
//! Denials and backend failures surface as empty returns plus a closed
//! audit, never as errors to the caller.

pub mod access_point;
pub mod audit;
pub mod config;
pub mod locks;
pub mod telemetry;

pub use access_point::{
    classify, AccessPoint, AccessPointBuilder, LOCKED_MESSAGE, NO_RESULTS_MESSAGE,
    QUERY_NOT_AUTHORIZED,
};
pub use audit::{AuditSink, InMemoryAuditSink, OpenAudit, TracingAuditSink};
pub use config::{AccessConfig, DEFAULT_MAXIMUM_BATCH_SIZE};
pub use locks::{FieldLockProvider, StaticFieldLocks};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
