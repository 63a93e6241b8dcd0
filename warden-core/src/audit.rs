use crate::policy::{ActionType, ResponseType};
use crate::{EntityId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Audit entry for one mediated operation.
///
/// Opened when the operation starts and closed exactly once when it ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    pub audit_id: EntityId,
    pub action: ActionType,
    pub actor: String,
    /// Identity key of the target record, or the query key for searches.
    pub resource: Option<String>,
    pub resource_model: Option<String>,
    pub response: ResponseType,
    pub message: Option<String>,
    pub opened_at: Timestamp,
    pub closed_at: Option<Timestamp>,
}

impl Audit {
    pub fn open(action: ActionType, actor: impl Into<String>) -> Self {
        Self {
            audit_id: crate::new_instance_id(),
            action,
            actor: actor.into(),
            resource: None,
            resource_model: None,
            response: ResponseType::Pending,
            message: None,
            opened_at: Utc::now(),
            closed_at: None,
        }
    }

    pub fn with_resource(mut self, model: impl Into<String>, resource: Option<String>) -> Self {
        self.resource_model = Some(model.into());
        self.resource = resource;
        self
    }

    pub fn close(&mut self, response: ResponseType, message: Option<String>) {
        self.response = response;
        self.message = message;
        self.closed_at = Some(Utc::now());
    }

    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_lifecycle() {
        let mut audit = Audit::open(ActionType::Read, "user:id=1")
            .with_resource("document", Some("document:id=2".to_string()));
        assert!(!audit.is_closed());
        assert_eq!(audit.response, ResponseType::Pending);

        audit.close(ResponseType::Deny, Some("nope".to_string()));
        assert!(audit.is_closed());
        assert_eq!(audit.response, ResponseType::Deny);
        assert!(audit.closed_at.unwrap() >= audit.opened_at);
    }
}
