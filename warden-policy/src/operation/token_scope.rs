use super::{Operation, OperationContext};
use crate::fact::Fact;
use crate::token::TokenService;
use std::sync::Arc;
use tracing::{debug, warn};
use warden_core::names::{FIELD_ID, FIELD_URN};
use warden_core::{OperationResponse, Query, Record};
use warden_storage::RecordSearch;

/// Checks that the request's bearer token was issued for the reference
/// record and carries the requested scope.
///
/// Identity or scope mismatches evaluate to `Failed`.
pub struct TokenScopeOperation {
    tokens: Arc<dyn TokenService>,
    search: Arc<dyn RecordSearch>,
}

impl TokenScopeOperation {
    pub const NAME: &'static str = "token_scope";

    pub fn new(tokens: Arc<dyn TokenService>, search: Arc<dyn RecordSearch>) -> Self {
        Self { tokens, search }
    }

    fn resolve_target(&self, model: &str, reference: &str) -> Option<Record> {
        let query = match reference.parse::<i64>() {
            Ok(id) if id > 0 => Query::new(model).field(FIELD_ID, id),
            _ => Query::new(model).field(FIELD_URN, reference),
        };
        match self.search.find(&query.select([FIELD_ID, FIELD_URN])) {
            Ok(result) => result.into_first(),
            Err(e) => {
                warn!(model, error = %e, "Token target lookup failed");
                None
            }
        }
    }
}

fn identifies(record: &Record, resource_id: &str) -> bool {
    if record.get::<String>(FIELD_URN).is_ok_and(|urn| urn == resource_id) {
        return true;
    }
    record
        .get::<i64>(FIELD_ID)
        .is_ok_and(|id| id > 0 && id.to_string() == resource_id)
}

impl Operation for TokenScopeOperation {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn evaluate(
        &self,
        _source: &Fact,
        reference: &Fact,
        context: &OperationContext<'_>,
    ) -> OperationResponse {
        let (Some(token), Some(scope)) = (context.token, context.requested_scope) else {
            debug!("Token scope check without token or scope");
            return OperationResponse::Error;
        };
        let (Some(target_ref), Some(target_model)) =
            (reference.source_urn.as_deref(), reference.model_type.as_deref())
        else {
            debug!("Token scope reference is missing urn or type");
            return OperationResponse::Error;
        };

        let claims = match self.tokens.validate(token) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(error = %e, "Bearer token rejected");
                return OperationResponse::Failed;
            }
        };

        let Some(target) = self.resolve_target(target_model, target_ref) else {
            debug!(model = target_model, reference = target_ref, "Token target did not resolve");
            return OperationResponse::Error;
        };

        let resource_matches =
            claims.resource_type == target.model() && identifies(&target, &claims.resource_id);
        let scope_matches = claims.has_scope(scope);
        debug!(
            sub = %claims.sub,
            resource_matches,
            scope_matches,
            "Token scope evaluated"
        );
        if resource_matches && scope_matches {
            OperationResponse::Succeeded
        } else {
            OperationResponse::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{JwtSecret, JwtTokenService, TokenClaims};
    use warden_core::{Clock, FieldDef, ManualClock, ModelDefinition, SchemaRegistry, ValueKind};
    use warden_storage::{InMemoryStore, RecordWriter};

    struct Fixture {
        op: TokenScopeOperation,
        tokens: Arc<JwtTokenService>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let reg = SchemaRegistry::builder()
            .model(
                ModelDefinition::new("document")
                    .field(FieldDef::new("id", ValueKind::Long).identity())
                    .field(FieldDef::new("urn", ValueKind::String).identity()),
            )
            .build()
            .unwrap();
        let store = Arc::new(InMemoryStore::new());
        let mut doc = reg.new_record("document").unwrap();
        doc.set("urn", "urn:doc:1").unwrap();
        store.create(&mut doc).unwrap();

        let clock = Arc::new(ManualClock::fixed());
        let tokens = Arc::new(JwtTokenService::with_clock(
            JwtSecret::new("scope-secret").unwrap(),
            clock.clone(),
        ));
        Fixture {
            op: TokenScopeOperation::new(tokens.clone(), store),
            tokens,
            clock,
        }
    }

    fn token(f: &Fixture, resource_type: &str, resource_id: &str, scope: &str) -> String {
        let claims = TokenClaims::new("urn:user:1", resource_type, resource_id, f.clock.now_epoch_secs(), 600)
            .with_scope(scope);
        f.tokens.issue(&claims).unwrap()
    }

    fn eval(f: &Fixture, token: &str, scope: &str, reference: &Fact) -> OperationResponse {
        let ctx = OperationContext::default().with_token(token, scope);
        f.op.evaluate(&Fact::default(), reference, &ctx)
    }

    #[test]
    fn test_matching_resource_and_scope_succeeds() {
        let f = fixture();
        let doc = Fact::new("document").with_urn("urn:doc:1");
        let t = token(&f, "document", "urn:doc:1", "read");
        assert_eq!(eval(&f, &t, "read", &doc), OperationResponse::Succeeded);

        let by_id = token(&f, "document", "1", "read");
        assert_eq!(eval(&f, &by_id, "read", &doc), OperationResponse::Succeeded);
    }

    #[test]
    fn test_mismatches_fail() {
        let f = fixture();
        let doc = Fact::new("document").with_urn("urn:doc:1");
        let wrong_scope = token(&f, "document", "urn:doc:1", "read");
        assert_eq!(eval(&f, &wrong_scope, "write", &doc), OperationResponse::Failed);

        let wrong_resource = token(&f, "document", "urn:doc:2", "read");
        assert_eq!(eval(&f, &wrong_resource, "read", &doc), OperationResponse::Failed);

        let wrong_type = token(&f, "user", "urn:doc:1", "read");
        assert_eq!(eval(&f, &wrong_type, "read", &doc), OperationResponse::Failed);

        assert_eq!(eval(&f, "garbage", "read", &doc), OperationResponse::Failed);
    }

    #[test]
    fn test_missing_inputs_error() {
        let f = fixture();
        let doc = Fact::new("document").with_urn("urn:doc:1");
        let t = token(&f, "document", "urn:doc:1", "read");

        let no_token = f.op.evaluate(&Fact::default(), &doc, &OperationContext::default());
        assert_eq!(no_token, OperationResponse::Error);
        assert_eq!(eval(&f, &t, "read", &Fact::new("document")), OperationResponse::Error);

        let missing = Fact::new("document").with_urn("urn:doc:404");
        assert_eq!(eval(&f, &t, "read", &missing), OperationResponse::Error);
    }
}
