//! Audit lifecycle: sinks and the open-audit guard.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};
use warden_core::{ActionType, Audit, PolicyResponse, Record, ResponseType};

/// Persists audits. The access point only ever starts and closes them.
pub trait AuditSink: Send + Sync {
    fn start(&self, audit: &Audit);

    fn close(&self, audit: &Audit);
}

/// An audit that has been started and not yet closed.
///
/// Closing consumes the guard. A guard dropped without an explicit close is
/// closed as `Failed`, so no exit path leaves an audit open.
#[must_use = "an open audit must be closed"]
pub struct OpenAudit {
    sink: Arc<dyn AuditSink>,
    audit: Option<Audit>,
}

impl OpenAudit {
    pub fn start(sink: Arc<dyn AuditSink>, action: ActionType, actor: &Record) -> Self {
        let audit = Audit::open(action, actor.reference_key());
        sink.start(&audit);
        Self {
            sink,
            audit: Some(audit),
        }
    }

    /// Record the target record.
    pub fn resource(&mut self, record: &Record) {
        if let Some(audit) = self.audit.as_mut() {
            audit.resource_model = Some(record.model().to_string());
            audit.resource = Some(record.reference_key());
        }
    }

    /// Record the query a search ran.
    pub fn query(&mut self, model: &str, key: String) {
        if let Some(audit) = self.audit.as_mut() {
            audit.resource_model = Some(model.to_string());
            audit.resource = Some(key);
        }
    }

    pub fn close(mut self, response: ResponseType, message: Option<String>) {
        self.finish(response, message);
    }

    /// Close with a decision, keeping the decision's message unless one is given.
    pub fn close_with(mut self, decision: &PolicyResponse, message: Option<String>) {
        let message = message.or_else(|| decision.message.clone());
        self.finish(decision.decision.into(), message);
    }

    fn finish(&mut self, response: ResponseType, message: Option<String>) {
        if let Some(mut audit) = self.audit.take() {
            audit.close(response, message);
            self.sink.close(&audit);
        }
    }
}

impl Drop for OpenAudit {
    fn drop(&mut self) {
        if self.audit.is_some() {
            warn!("Audit dropped without an outcome");
            self.finish(ResponseType::Failed, Some("Audit closed without outcome".to_string()));
        }
    }
}

/// Keeps audits in memory; used for embedding and tests.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    started: Mutex<Vec<Audit>>,
    closed: Mutex<Vec<Audit>>,
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started_count(&self) -> usize {
        guard(&self.started).len()
    }

    pub fn closed_count(&self) -> usize {
        guard(&self.closed).len()
    }

    /// Started audits with no matching close.
    pub fn open_count(&self) -> usize {
        let closed = guard(&self.closed);
        guard(&self.started)
            .iter()
            .filter(|s| !closed.iter().any(|c| c.audit_id == s.audit_id))
            .count()
    }

    pub fn closed(&self) -> Vec<Audit> {
        guard(&self.closed).clone()
    }

    pub fn last(&self) -> Option<Audit> {
        guard(&self.closed).last().cloned()
    }

    pub fn clear(&self) {
        guard(&self.started).clear();
        guard(&self.closed).clear();
    }
}

impl AuditSink for InMemoryAuditSink {
    fn start(&self, audit: &Audit) {
        guard(&self.started).push(audit.clone());
    }

    fn close(&self, audit: &Audit) {
        guard(&self.closed).push(audit.clone());
    }
}

/// Emits closed audits as structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn start(&self, _audit: &Audit) {}

    fn close(&self, audit: &Audit) {
        let elapsed_ms = audit
            .closed_at
            .map(|at| (at - audit.opened_at).num_milliseconds())
            .unwrap_or_default();
        info!(
            target: "warden_access::audit",
            audit_id = %audit.audit_id,
            action = %audit.action,
            actor = %audit.actor,
            resource = audit.resource.as_deref().unwrap_or(""),
            response = ?audit.response,
            message = audit.message.as_deref().unwrap_or(""),
            elapsed_ms,
            "Audit closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{FieldDef, ModelDefinition, SchemaRegistry, ValueKind};

    fn actor() -> Record {
        let reg = SchemaRegistry::builder()
            .model(ModelDefinition::new("user").field(FieldDef::new("id", ValueKind::Long).identity()))
            .build()
            .unwrap();
        let mut user = reg.new_record("user").unwrap();
        user.set("id", 1i64).unwrap();
        user
    }

    #[test]
    fn test_explicit_close() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let audit = OpenAudit::start(sink.clone(), ActionType::Read, &actor());
        assert_eq!(sink.open_count(), 1);
        audit.close_with(&PolicyResponse::deny("nope"), None);

        assert_eq!(sink.open_count(), 0);
        let closed = sink.last().unwrap();
        assert_eq!(closed.response, ResponseType::Deny);
        assert_eq!(closed.message.as_deref(), Some("nope"));
        assert_eq!(closed.actor, "user:id=1");
    }

    #[test]
    fn test_drop_closes_as_failed() {
        let sink = Arc::new(InMemoryAuditSink::new());
        {
            let _audit = OpenAudit::start(sink.clone(), ActionType::Add, &actor());
        }
        assert_eq!(sink.started_count(), 1);
        assert_eq!(sink.closed_count(), 1);
        assert_eq!(sink.last().unwrap().response, ResponseType::Failed);
    }
}
