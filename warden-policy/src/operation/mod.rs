//! Fact operations evaluated while matching policy patterns.
//!
//! An operation compares a source fact against a reference fact and reports
//! an [`OperationResponse`]. `Error` means the inputs were structurally
//! unusable, `Failed` is a definite negative, `Unknown` means no definite
//! outcome was reached. New predicates are added by implementing
//! [`Operation`] and registering the implementation by name.

mod owner;
mod token_scope;

pub use owner::OwnerOperation;
pub use token_scope::TokenScopeOperation;

use crate::fact::Fact;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use warden_core::{OperationResponse, PolicyResponse, Record};

/// Request-scoped inputs available to an operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationContext<'a> {
    pub actor: Option<&'a Record>,
    /// Bearer token presented with the request.
    pub token: Option<&'a str>,
    pub requested_scope: Option<&'a str>,
}

impl<'a> OperationContext<'a> {
    pub fn for_actor(actor: &'a Record) -> Self {
        Self {
            actor: Some(actor),
            ..Default::default()
        }
    }

    pub fn with_token(mut self, token: &'a str, scope: &'a str) -> Self {
        self.token = Some(token);
        self.requested_scope = Some(scope);
        self
    }
}

pub trait Operation: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(
        &self,
        source: &Fact,
        reference: &Fact,
        context: &OperationContext<'_>,
    ) -> OperationResponse;
}

/// Name-keyed set of operations.
#[derive(Default)]
pub struct OperationRegistry {
    operations: HashMap<String, Arc<dyn Operation>>,
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.operations.keys().collect();
        names.sort();
        f.debug_struct("OperationRegistry")
            .field("operations", &names)
            .finish()
    }
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the operation's own name, replacing any previous entry.
    pub fn register(&mut self, operation: Arc<dyn Operation>) {
        self.operations
            .insert(operation.name().to_string(), operation);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Operation>> {
        self.operations.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.operations.keys().map(String::as_str).collect()
    }

    /// Run the named operation. Unknown names evaluate to `Error`.
    pub fn evaluate(
        &self,
        name: &str,
        source: &Fact,
        reference: &Fact,
        context: &OperationContext<'_>,
    ) -> OperationResponse {
        let Some(operation) = self.operations.get(name) else {
            warn!(operation = name, "Unknown fact operation");
            return OperationResponse::Error;
        };
        let outcome = operation.evaluate(source, reference, context);
        debug!(operation = name, ?outcome, "Fact operation evaluated");
        outcome
    }

    /// Evaluate and map the outcome to a decision. Only `Succeeded` permits.
    pub fn evaluate_pattern(
        &self,
        name: &str,
        source: &Fact,
        reference: &Fact,
        context: &OperationContext<'_>,
    ) -> PolicyResponse {
        match self.evaluate(name, source, reference, context) {
            OperationResponse::Succeeded => PolicyResponse::permit(),
            other => PolicyResponse::deny(format!("Operation {} returned {:?}", name, other)),
        }
    }
}
