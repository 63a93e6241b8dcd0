//! Property-Based Tests for the Access Point
//!
//! **Property 1: Query authorization** - a query is authorized only if every
//! constrained field is permitted, and the first non-PERMIT decision in field
//! order is the one reported.
//!
//! **Property 2: Audit balance** - every public call opens exactly one audit
//! and closes it before returning, whatever the outcome.
//!
//! **Property 3: Write classification** - records with populated identity
//! are modifications; all others are additions.

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use warden_access::{classify, AccessPoint, InMemoryAuditSink};
use warden_core::{ActionType, OperationResponse, PolicyResponse, Query};
use warden_storage::InMemoryStore;
use warden_test_utils::fixtures::{actor, new_user, sample_registry};
use warden_test_utils::generators::{arb_field_name, arb_name, arb_policy_response};
use warden_test_utils::ScriptedAuthorizer;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn access_point(authorizer: ScriptedAuthorizer) -> (AccessPoint, Arc<InMemoryAuditSink>) {
    let store = Arc::new(InMemoryStore::new());
    let audits = Arc::new(InMemoryAuditSink::new());
    let access = AccessPoint::builder()
        .writer(store.clone())
        .search(store)
        .authorizer(Arc::new(authorizer))
        .audit_sink(audits.clone())
        .build()
        .expect("access point builds");
    (access, audits)
}

// ============================================================================
// PROPERTY TEST STRATEGIES
// ============================================================================

/// Field constraints paired with the decision the authorizer gives each field.
fn field_decisions() -> impl Strategy<Value = BTreeMap<String, (String, PolicyResponse)>> {
    proptest::collection::btree_map(arb_field_name(), (arb_name(), arb_policy_response()), 1..6)
}

#[derive(Debug, Clone)]
enum Call {
    Find(String),
    FindById(i64),
    List(String),
    Count(String),
    Create(String),
}

fn call_strategy() -> impl Strategy<Value = Call> {
    prop_oneof![
        arb_name().prop_map(Call::Find),
        (-3i64..20).prop_map(Call::FindById),
        arb_name().prop_map(Call::List),
        arb_name().prop_map(Call::Count),
        arb_name().prop_map(Call::Create),
    ]
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// **Property 1: Query authorization**
    #[test]
    fn prop_query_authorization_reports_first_denial(fields in field_decisions()) {
        let authorizer = fields
            .iter()
            .fold(ScriptedAuthorizer::permit_all(), |auth, (name, (_, response))| {
                auth.respond_to_field(name.clone(), response.clone())
            });
        let query = fields
            .iter()
            .fold(Query::new("user"), |q, (name, (value, _))| q.field(name.clone(), value.clone()));
        let (access, audits) = access_point(authorizer);

        let responses: Vec<&PolicyResponse> = fields.values().map(|(_, r)| r).collect();
        let expected = responses
            .iter()
            .find(|r| !r.is_permit())
            .or_else(|| responses.first())
            .map(|r| (*r).clone());

        let decision = access.authorize_query(&actor(&sample_registry(), 1), &query);
        prop_assert_eq!(&decision, &expected);

        let result = access.list(&actor(&sample_registry(), 1), &query);
        let authorized = responses.iter().all(|r| r.is_permit());
        if authorized {
            prop_assert_eq!(result.status, OperationResponse::Succeeded);
        } else {
            prop_assert_eq!(result.status, OperationResponse::Failed);
        }
        prop_assert_eq!(audits.open_count(), 0);
    }

    /// **Property 2: Audit balance**
    #[test]
    fn prop_each_call_opens_and_closes_one_audit(
        calls in proptest::collection::vec(call_strategy(), 1..20),
        deny_reads in any::<bool>(),
    ) {
        let authorizer = if deny_reads {
            ScriptedAuthorizer::permit_all().deny_action(ActionType::Read, "hidden")
        } else {
            ScriptedAuthorizer::permit_all()
        };
        let (access, audits) = access_point(authorizer);
        let registry = sample_registry();
        let actor = actor(&registry, 1);

        for (n, call) in calls.iter().enumerate() {
            match call {
                Call::Find(name) => {
                    access.find(&actor, &Query::new("user").field("name", name.as_str()));
                }
                Call::FindById(id) => {
                    access.find_by_id(&actor, "user", *id);
                }
                Call::List(name) => {
                    access.list(&actor, &Query::new("user").field("name", name.as_str()));
                }
                Call::Count(name) => {
                    access.count(&actor, &Query::new("user").field("name", name.as_str()));
                }
                Call::Create(name) => {
                    access.create(&actor, new_user(&registry, name));
                }
            }
            prop_assert_eq!(audits.started_count(), n + 1);
            prop_assert_eq!(audits.closed_count(), n + 1);
        }
        prop_assert_eq!(audits.open_count(), 0);
    }

    /// **Property 3: Write classification**
    #[test]
    fn prop_identity_decides_classification(name in arb_name(), id in proptest::option::of(1i64..10_000)) {
        let registry = sample_registry();
        let mut user = new_user(&registry, &name);
        if let Some(id) = id {
            user.set("id", id).unwrap();
        }
        let expected = if id.is_some() { ActionType::Modify } else { ActionType::Add };
        prop_assert_eq!(classify(&user), expected);
    }
}
