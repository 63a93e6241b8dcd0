//! Policy decision and outcome vocabulary.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Action being authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Add,
    Modify,
    Delete,
    Read,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionType::Add => "ADD",
            ActionType::Modify => "MODIFY",
            ActionType::Delete => "DELETE",
            ActionType::Read => "READ",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionType {
    Permit,
    Deny,
    Indeterminate,
    NotApplicable,
    Invalid,
}

/// Decision returned by an authorization provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyResponse {
    pub decision: DecisionType,
    pub message: Option<String>,
    /// After this instant a cached copy of the decision must not be reused.
    pub expires_at: Option<Timestamp>,
}

impl PolicyResponse {
    pub fn new(decision: DecisionType, message: Option<String>) -> Self {
        Self {
            decision,
            message,
            expires_at: None,
        }
    }

    pub fn permit() -> Self {
        Self::new(DecisionType::Permit, None)
    }

    pub fn deny(message: impl Into<String>) -> Self {
        Self::new(DecisionType::Deny, Some(message.into()))
    }

    pub fn with_expiry(mut self, expires_at: Timestamp) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_permit(&self) -> bool {
        self.decision == DecisionType::Permit
    }
}

/// Final status recorded on an audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseType {
    Permit,
    Deny,
    Invalid,
    Failed,
    Pending,
}

impl From<DecisionType> for ResponseType {
    fn from(decision: DecisionType) -> Self {
        match decision {
            DecisionType::Permit => ResponseType::Permit,
            DecisionType::Invalid => ResponseType::Invalid,
            DecisionType::Deny | DecisionType::Indeterminate | DecisionType::NotApplicable => {
                ResponseType::Deny
            }
        }
    }
}

/// Outcome of an operation evaluation or backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationResponse {
    Succeeded,
    Failed,
    Error,
    Unknown,
    Pending,
}
