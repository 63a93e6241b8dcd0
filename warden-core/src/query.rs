//! Declarative equality queries and their results.

use crate::policy::OperationResponse;
use crate::{compute_digest, Record, Value};
use serde::Serialize;

/// Equality constraint on one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryField {
    pub name: String,
    pub value: Value,
}

/// Inclusive start offset and maximum row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueryRange {
    pub start: u64,
    pub count: u64,
}

/// Equality query against a single model.
///
/// Two queries with the same model, constraints (in order), projection,
/// flags and scoping produce the same [`Query::key`] and [`Query::hash`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    pub model: String,
    pub fields: Vec<QueryField>,
    pub projection: Vec<String>,
    pub cache_enabled: bool,
    pub context_user: Option<String>,
    pub org_scope: Option<i64>,
    pub range: Option<QueryRange>,
}

impl Query {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            fields: Vec::new(),
            projection: Vec::new(),
            cache_enabled: true,
            context_user: None,
            org_scope: None,
            range: None,
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push(QueryField {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Restrict returned fields. An empty projection returns every field.
    pub fn select<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn cached(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn range(mut self, start: u64, count: u64) -> Self {
        self.range = Some(QueryRange { start, count });
        self
    }

    pub fn with_context_user(mut self, user: impl Into<String>) -> Self {
        self.context_user = Some(user.into());
        self
    }

    pub fn with_org_scope(mut self, organization_id: i64) -> Self {
        self.org_scope = Some(organization_id);
        self
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn field_value(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Canonical serialized form.
    pub fn key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }

    /// Digest of [`Query::key`].
    pub fn hash(&self) -> String {
        compute_digest(&self.key())
    }
}

/// Result set paired with the query that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub query: Query,
    /// Model the results belong to.
    pub model: String,
    /// Hash of the query this result was produced for.
    pub query_hash: String,
    pub results: Vec<Record>,
    pub status: OperationResponse,
    pub message: Option<String>,
    /// May exceed `results.len()` for paged results.
    pub total_count: u64,
}

impl QueryResult {
    pub fn new(query: Query, results: Vec<Record>) -> Self {
        let total_count = results.len() as u64;
        Self::paged(query, results, total_count)
    }

    pub fn paged(query: Query, results: Vec<Record>, total_count: u64) -> Self {
        Self {
            model: query.model.clone(),
            query_hash: query.hash(),
            query,
            results,
            status: OperationResponse::Succeeded,
            message: None,
            total_count,
        }
    }

    /// Empty result carrying a failure status and message.
    pub fn failed(query: Query, message: impl Into<String>) -> Self {
        Self {
            status: OperationResponse::Failed,
            message: Some(message.into()),
            ..Self::new(query, Vec::new())
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn first(&self) -> Option<&Record> {
        self.results.first()
    }

    pub fn into_first(self) -> Option<Record> {
        self.results.into_iter().next()
    }
}
