use crate::names::FIELD_URN;
use crate::{Record, Value};
use serde::Serialize;

/// Identity descriptor used to address cache invalidation without a full record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexEntry {
    pub model: String,
    pub identity: Vec<(String, Value)>,
}

impl IndexEntry {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            identity: Vec::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.identity.push((name.into(), value.into()));
        self
    }

    /// Capture the populated identity fields of `record`.
    pub fn from_record(record: &Record) -> Self {
        Self {
            model: record.model().to_string(),
            identity: record
                .identity_values()
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        }
    }

    /// Counterpart of `Record::reference_key` for the identity values held here.
    pub fn reference_key(&self) -> Option<String> {
        let populated = || self.identity.iter().filter(|(_, v)| v.is_populated());
        if let Some((_, Value::String(urn))) = populated().find(|(n, _)| n == FIELD_URN) {
            return Some(urn.clone());
        }
        populated()
            .next()
            .map(|(name, value)| format!("{}:{}={}", self.model, name, value.canonical_string()))
    }

    /// Same model and at least one populated identity value in common, none conflicting.
    pub fn matches(&self, record: &Record) -> bool {
        if record.model() != self.model {
            return false;
        }
        let mut shared = 0;
        for (name, value) in self.identity.iter().filter(|(_, v)| v.is_populated()) {
            match record.value(name).filter(|v| v.is_populated()) {
                Some(theirs) if theirs != value => return false,
                Some(_) => shared += 1,
                None => {}
            }
        }
        shared > 0
    }
}
