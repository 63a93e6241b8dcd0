//! Authorization provider seam.

use warden_core::{ActionType, PolicyResponse, QueryField, Record};

/// What a decision is being requested about.
#[derive(Debug, Clone, Copy)]
pub enum PolicySubject<'a> {
    Record(&'a Record),
    /// One equality constraint of a query against `model`.
    Field {
        model: &'a str,
        field: &'a QueryField,
    },
}

impl PolicySubject<'_> {
    pub fn model(&self) -> &str {
        match self {
            PolicySubject::Record(record) => record.model(),
            PolicySubject::Field { model, .. } => model,
        }
    }
}

/// Produces PERMIT/DENY decisions. The rule set behind it is opaque here.
///
/// Implementations return a decision value for every request; denial is
/// never signalled through an error.
pub trait AuthorizationProvider: Send + Sync {
    fn decide(&self, actor: &Record, action: ActionType, subject: PolicySubject<'_>)
        -> PolicyResponse;

    fn can_create(&self, actor: &Record, record: &Record) -> PolicyResponse {
        self.decide(actor, ActionType::Add, PolicySubject::Record(record))
    }

    fn can_read(&self, actor: &Record, record: &Record) -> PolicyResponse {
        self.decide(actor, ActionType::Read, PolicySubject::Record(record))
    }

    fn can_update(&self, actor: &Record, record: &Record) -> PolicyResponse {
        self.decide(actor, ActionType::Modify, PolicySubject::Record(record))
    }

    fn can_delete(&self, actor: &Record, record: &Record) -> PolicyResponse {
        self.decide(actor, ActionType::Delete, PolicySubject::Record(record))
    }

    fn can_read_field(&self, actor: &Record, model: &str, field: &QueryField) -> PolicyResponse {
        self.decide(actor, ActionType::Read, PolicySubject::Field { model, field })
    }
}
