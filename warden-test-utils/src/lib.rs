//! WARDEN Test Utilities
//!
//! Centralized test infrastructure for the Warden workspace:
//! - A sample schema registry and record builders
//! - Scripted and counting collaborators for the access point
//! - Proptest generators for decisions and queries
//! - Custom assertions

pub use warden_core::{
    ActionType, DecisionType, PolicyResponse, Query, QueryResult, Record, SchemaRegistry,
    StorageError, Value, WardenError, WardenResult,
};

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use warden_core::names::{FIELD_ID, FIELD_NAME, FIELD_ORGANIZATION_ID, FIELD_PARENT_ID};
use warden_policy::{AuthorizationProvider, PolicySubject};
use warden_storage::{
    InMemoryStore, Locator, PathResolver, RecordReader, RecordSearch, RecordWriter,
};

// ============================================================================
// MOCK COLLABORATORS
// ============================================================================

/// Authorization provider driven by explicit rules.
///
/// Field decisions are looked up by field name, record decisions by action;
/// anything without a rule gets the default.
#[derive(Debug)]
pub struct ScriptedAuthorizer {
    default: PolicyResponse,
    fields: DashMap<String, PolicyResponse>,
    actions: DashMap<ActionType, PolicyResponse>,
    record_calls: AtomicUsize,
    field_calls: AtomicUsize,
}

impl ScriptedAuthorizer {
    pub fn permit_all() -> Self {
        Self::with_default(PolicyResponse::permit())
    }

    pub fn deny_all(message: impl Into<String>) -> Self {
        Self::with_default(PolicyResponse::deny(message))
    }

    pub fn with_default(default: PolicyResponse) -> Self {
        Self {
            default,
            fields: DashMap::new(),
            actions: DashMap::new(),
            record_calls: AtomicUsize::new(0),
            field_calls: AtomicUsize::new(0),
        }
    }

    pub fn deny_field(self, name: impl Into<String>, message: impl Into<String>) -> Self {
        self.respond_to_field(name, PolicyResponse::deny(message))
    }

    pub fn respond_to_field(self, name: impl Into<String>, response: PolicyResponse) -> Self {
        self.fields.insert(name.into(), response);
        self
    }

    pub fn deny_action(self, action: ActionType, message: impl Into<String>) -> Self {
        self.respond_to_action(action, PolicyResponse::deny(message))
    }

    pub fn respond_to_action(self, action: ActionType, response: PolicyResponse) -> Self {
        self.actions.insert(action, response);
        self
    }

    /// Number of record-level decisions requested.
    pub fn record_calls(&self) -> usize {
        self.record_calls.load(Ordering::SeqCst)
    }

    /// Number of field-level decisions requested.
    pub fn field_calls(&self) -> usize {
        self.field_calls.load(Ordering::SeqCst)
    }
}

impl AuthorizationProvider for ScriptedAuthorizer {
    fn decide(&self, _actor: &Record, action: ActionType, subject: PolicySubject<'_>) -> PolicyResponse {
        match subject {
            PolicySubject::Field { field, .. } => {
                self.field_calls.fetch_add(1, Ordering::SeqCst);
                self.fields
                    .get(&field.name)
                    .map(|r| r.value().clone())
                    .unwrap_or_else(|| self.default.clone())
            }
            PolicySubject::Record(_) => {
                self.record_calls.fetch_add(1, Ordering::SeqCst);
                self.actions
                    .get(&action)
                    .map(|r| r.value().clone())
                    .unwrap_or_else(|| self.default.clone())
            }
        }
    }
}

/// Search decorator counting backend calls.
pub struct CountingSearch {
    inner: Arc<dyn RecordSearch>,
    finds: AtomicUsize,
    counts: AtomicUsize,
}

impl CountingSearch {
    pub fn new(inner: Arc<dyn RecordSearch>) -> Self {
        Self {
            inner,
            finds: AtomicUsize::new(0),
            counts: AtomicUsize::new(0),
        }
    }

    pub fn finds(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    pub fn counts(&self) -> usize {
        self.counts.load(Ordering::SeqCst)
    }
}

impl RecordSearch for CountingSearch {
    fn find(&self, query: &Query) -> WardenResult<QueryResult> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.inner.find(query)
    }

    fn count(&self, query: &Query) -> WardenResult<u64> {
        self.counts.fetch_add(1, Ordering::SeqCst);
        self.inner.count(query)
    }
}

/// Writer whose backend is always unavailable.
#[derive(Debug, Default)]
pub struct FailingWriter {
    attempts: AtomicUsize,
}

impl FailingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn fail(&self) -> WardenResult<bool> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Unavailable {
            reason: "backend offline".to_string(),
        }
        .into())
    }
}

impl RecordWriter for FailingWriter {
    fn create(&self, _record: &mut Record) -> WardenResult<bool> {
        self.fail()
    }

    fn update(&self, _record: &Record) -> WardenResult<bool> {
        self.fail()
    }

    fn delete(&self, _record: &Record) -> WardenResult<bool> {
        self.fail()
    }
}

/// Path resolver storing one record per path segment in an [`InMemoryStore`].
///
/// Each segment is a record of the requested model named after the segment,
/// linked to its parent through `parentId` when the model has that field.
pub struct InMemoryPathResolver {
    registry: Arc<SchemaRegistry>,
    store: Arc<InMemoryStore>,
    paths: DashMap<String, i64>,
}

impl InMemoryPathResolver {
    pub fn new(registry: Arc<SchemaRegistry>, store: Arc<InMemoryStore>) -> Self {
        Self {
            registry,
            store,
            paths: DashMap::new(),
        }
    }

    fn key(model: &str, organization_id: Option<i64>, path: &str) -> String {
        format!("{}:{}:{}", model, organization_id.unwrap_or(0), path)
    }

    fn segments(path: &str) -> impl Iterator<Item = &str> {
        path.split('/').filter(|s| !s.is_empty())
    }

    fn normalize(path: &str) -> String {
        let joined: Vec<&str> = Self::segments(path).collect();
        format!("/{}", joined.join("/"))
    }
}

impl PathResolver for InMemoryPathResolver {
    fn find_path(
        &self,
        _actor: &Record,
        model: &str,
        path: &str,
        _kind: Option<&str>,
        organization_id: Option<i64>,
    ) -> WardenResult<Option<Record>> {
        let key = Self::key(model, organization_id, &Self::normalize(path));
        let Some(id) = self.paths.get(&key).map(|id| *id) else {
            return Ok(None);
        };
        self.store.read(&Locator::by_id(model, id))
    }

    fn make_path(
        &self,
        _actor: &Record,
        model: &str,
        path: &str,
        kind: Option<&str>,
        organization_id: Option<i64>,
    ) -> WardenResult<Option<Record>> {
        let mut prefix = String::new();
        let mut parent: Option<i64> = None;
        for segment in Self::segments(path) {
            prefix.push('/');
            prefix.push_str(segment);
            let key = Self::key(model, organization_id, &prefix);
            if let Some(id) = self.paths.get(&key).map(|id| *id) {
                parent = Some(id);
                continue;
            }

            let mut record = self.registry.new_record(model)?;
            record.set(FIELD_NAME, segment)?;
            if let (Some(pid), true) = (parent, record.has_field(FIELD_PARENT_ID)) {
                record.set(FIELD_PARENT_ID, pid)?;
            }
            if let (Some(org), true) = (organization_id, record.has_field(FIELD_ORGANIZATION_ID)) {
                record.set(FIELD_ORGANIZATION_ID, org)?;
            }
            if let (Some(kind), true) = (kind, record.has_field("type")) {
                record.set("type", kind)?;
            }
            self.store.create(&mut record)?;
            let id = record.get::<i64>(FIELD_ID)?;
            self.paths.insert(key, id);
            parent = Some(id);
        }
        match parent {
            Some(id) => self.store.read(&Locator::by_id(model, id)),
            None => Ok(None),
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for decisions and queries.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_decision_type() -> impl Strategy<Value = DecisionType> {
        prop_oneof![
            Just(DecisionType::Permit),
            Just(DecisionType::Deny),
            Just(DecisionType::Indeterminate),
            Just(DecisionType::NotApplicable),
            Just(DecisionType::Invalid),
        ]
    }

    pub fn arb_policy_response() -> impl Strategy<Value = PolicyResponse> {
        (arb_decision_type(), proptest::option::of("[a-z ]{1,16}"))
            .prop_map(|(decision, message)| PolicyResponse::new(decision, message))
    }

    /// Field names that do not collide with the model discriminator.
    pub fn arb_field_name() -> impl Strategy<Value = String> {
        "[a-z][a-zA-Z0-9]{0,11}".prop_filter("reserved", |s| s != warden_core::MODEL_KEY)
    }

    pub fn arb_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_-]{0,15}"
    }

    /// A `document` query with one to four distinct string constraints.
    pub fn arb_query() -> impl Strategy<Value = Query> {
        (
            proptest::collection::btree_map(arb_field_name(), arb_name(), 1..5),
            any::<bool>(),
        )
            .prop_map(|(fields, cached)| {
                fields
                    .into_iter()
                    .fold(Query::new("document"), |q, (name, value)| q.field(name, value))
                    .cached(cached)
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Sample schema and record builders.
    //!
    //! `common` carries the shared identity and ownership fields; `user`,
    //! `group`, `document` and `data` inherit it. `data` stores its bytes out
    //! of line.

    use super::*;
    use warden_core::names::{FIELD_GROUP_ID, FIELD_OWNER_ID, FIELD_URN};
    use warden_core::{FieldDef, ModelDefinition, ValueKind};
    use warden_storage::InMemoryByteStore;

    pub const ORG_ID: i64 = 1;

    pub fn sample_registry() -> Arc<SchemaRegistry> {
        SchemaRegistry::builder()
            .enum_type("userStatus", ["Normal", "Disabled", "Locked"])
            .byte_store(Arc::new(InMemoryByteStore::new()))
            .model(
                ModelDefinition::new("common")
                    .field(FieldDef::new("id", ValueKind::Long).identity())
                    .field(FieldDef::new("urn", ValueKind::String).identity())
                    .field(FieldDef::new("objectId", ValueKind::String).identity())
                    .field(FieldDef::new("name", ValueKind::String))
                    .field(FieldDef::new("organizationId", ValueKind::Long))
                    .field(FieldDef::new("ownerId", ValueKind::Long)),
            )
            .model(
                ModelDefinition::new("user")
                    .inherits("common")
                    .field(FieldDef::new("status", ValueKind::Enum).enumeration("userStatus")),
            )
            .model(
                ModelDefinition::new("group")
                    .inherits("common")
                    .field(FieldDef::new("parentId", ValueKind::Long))
                    .field(FieldDef::new("type", ValueKind::String)),
            )
            .model(
                ModelDefinition::new("document")
                    .inherits("common")
                    .field(FieldDef::new("groupId", ValueKind::Long))
                    .field(FieldDef::new("parentId", ValueKind::Long))
                    .field(FieldDef::new("type", ValueKind::String))
                    .field(FieldDef::new("description", ValueKind::String))
                    .field(FieldDef::new("tags", ValueKind::List).list_of(ValueKind::String))
                    .field(FieldDef::new("author", ValueKind::Model).bound_to("user")),
            )
            .model(
                ModelDefinition::new("data")
                    .inherits("common")
                    .field(FieldDef::new("groupId", ValueKind::Long))
                    .field(FieldDef::new("dataBytes", ValueKind::Blob))
                    .with_byte_store(),
            )
            .build()
            .expect("sample registry is valid")
    }

    /// An unsaved-looking user carrying the identity an actor needs.
    pub fn actor(registry: &Arc<SchemaRegistry>, id: i64) -> Record {
        let mut user = registry.new_record("user").expect("user model");
        user.set(FIELD_ID, id).expect("id");
        user.set(FIELD_URN, format!("urn:user:{}", id)).expect("urn");
        user.set(FIELD_ORGANIZATION_ID, ORG_ID).expect("organizationId");
        user
    }

    /// A new user without identity.
    pub fn new_user(registry: &Arc<SchemaRegistry>, name: &str) -> Record {
        let mut user = registry.new_record("user").expect("user model");
        user.set(FIELD_NAME, name).expect("name");
        user.set(FIELD_ORGANIZATION_ID, ORG_ID).expect("organizationId");
        user
    }

    /// A new document in `group_id` owned by `owner_id`, without identity.
    pub fn new_document(
        registry: &Arc<SchemaRegistry>,
        name: &str,
        group_id: i64,
        owner_id: i64,
    ) -> Record {
        let mut doc = registry.new_record("document").expect("document model");
        doc.set(FIELD_NAME, name).expect("name");
        doc.set(FIELD_GROUP_ID, group_id).expect("groupId");
        doc.set(FIELD_OWNER_ID, owner_id).expect("ownerId");
        doc.set(FIELD_ORGANIZATION_ID, ORG_ID).expect("organizationId");
        doc
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for decisions and results.

    use super::*;

    #[track_caller]
    pub fn assert_permit(response: &PolicyResponse) {
        assert!(response.is_permit(), "Expected PERMIT, got: {:?}", response);
    }

    #[track_caller]
    pub fn assert_not_permit(response: &PolicyResponse) {
        assert!(!response.is_permit(), "Expected a denial, got: {:?}", response);
    }

    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &WardenResult<T>) {
        match result {
            Err(WardenError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    /// Assert that every record in `result` has `field` equal to `value`.
    #[track_caller]
    pub fn assert_all_match(result: &QueryResult, field: &str, value: &Value) {
        for record in &result.results {
            assert_eq!(
                record.value(field),
                Some(value),
                "Record {} does not match {}",
                record.reference_key(),
                field
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_sample_registry_inheritance() {
        let reg = sample_registry();
        let doc = new_document(&reg, "notes", 5, 1);
        assert!(doc.inherits("common"));
        assert!(!doc.is_identity_record());
        assert!(actor(&reg, 7).is_identity_record());
    }

    #[test]
    fn test_make_then_find_path() {
        let reg = sample_registry();
        let store = Arc::new(InMemoryStore::new());
        let resolver = InMemoryPathResolver::new(reg.clone(), store.clone());
        let me = actor(&reg, 1);

        assert!(resolver
            .find_path(&me, "group", "/home/alice", None, Some(ORG_ID))
            .unwrap()
            .is_none());
        let made = resolver
            .make_path(&me, "group", "/home/alice", Some("data"), Some(ORG_ID))
            .unwrap()
            .unwrap();
        assert_eq!(made.get::<String>("name").unwrap(), "alice");
        assert_eq!(store.len("group").unwrap(), 2);

        let found = resolver
            .find_path(&me, "group", "home/alice/", None, Some(ORG_ID))
            .unwrap()
            .unwrap();
        assert_eq!(found, made);

        resolver
            .make_path(&me, "group", "/home/alice", None, Some(ORG_ID))
            .unwrap();
        assert_eq!(store.len("group").unwrap(), 2);
    }

    #[test]
    fn test_scripted_authorizer_rules() {
        let reg = sample_registry();
        let me = actor(&reg, 1);
        let doc = new_document(&reg, "d", 1, 1);
        let auth = ScriptedAuthorizer::permit_all()
            .deny_field("secret", "field secret")
            .deny_action(ActionType::Delete, "no deletes");

        assert!(auth.can_read(&me, &doc).is_permit());
        assert!(!auth.can_delete(&me, &doc).is_permit());
        let field = warden_core::QueryField {
            name: "secret".to_string(),
            value: Value::from("x"),
        };
        assert!(!auth.can_read_field(&me, "document", &field).is_permit());
        assert_eq!(auth.record_calls(), 2);
        assert_eq!(auth.field_calls(), 1);
    }
}
