//! The access point: the single mediation surface for policy-governed data.
//!
//! Every public operation opens exactly one audit on entry and closes it on
//! every exit path. Writes and reads proceed only on an explicit PERMIT;
//! anything else, including a missing decision, is a denial. Denials and
//! backend failures are reported through the audit and an empty return,
//! never as an error.

use crate::audit::{AuditSink, OpenAudit, TracingAuditSink};
use crate::config::AccessConfig;
use crate::locks::FieldLockProvider;
use std::sync::Arc;
use tracing::{debug, error, warn};
use warden_core::names::{
    FIELD_GROUP_ID, FIELD_ID, FIELD_NAME, FIELD_OBJECT_ID, FIELD_ORGANIZATION_ID,
    FIELD_PARENT_ID, FIELD_TYPE, FIELD_URN,
};
use warden_core::{
    ActionType, PolicyError, PolicyResponse, Query, QueryResult, Record, ResponseType,
    WardenResult,
};
use warden_policy::{combine_decisions, AuthorizationProvider};
use warden_storage::{Locator, PathResolver, RecordReader, RecordSearch, RecordWriter};

pub const LOCKED_MESSAGE: &str = "One or more fields are locked";
pub const NO_RESULTS_MESSAGE: &str = "No results";
pub const QUERY_NOT_AUTHORIZED: &str = "Query not authorized";

// ============================================================================
// BUILDER
// ============================================================================

#[derive(Default)]
pub struct AccessPointBuilder {
    writer: Option<Arc<dyn RecordWriter>>,
    search: Option<Arc<dyn RecordSearch>>,
    reader: Option<Arc<dyn RecordReader>>,
    authorizer: Option<Arc<dyn AuthorizationProvider>>,
    audits: Option<Arc<dyn AuditSink>>,
    paths: Option<Arc<dyn PathResolver>>,
    locks: Option<Arc<dyn FieldLockProvider>>,
    config: AccessConfig,
}

impl AccessPointBuilder {
    pub fn writer(mut self, writer: Arc<dyn RecordWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn search(mut self, search: Arc<dyn RecordSearch>) -> Self {
        self.search = Some(search);
        self
    }

    /// Point reads for lookups by id, urn and objectId. Without one they run
    /// as queries through the search.
    pub fn reader(mut self, reader: Arc<dyn RecordReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn authorizer(mut self, authorizer: Arc<dyn AuthorizationProvider>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// Defaults to [`TracingAuditSink`].
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audits = Some(sink);
        self
    }

    pub fn path_resolver(mut self, resolver: Arc<dyn PathResolver>) -> Self {
        self.paths = Some(resolver);
        self
    }

    pub fn field_locks(mut self, locks: Arc<dyn FieldLockProvider>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn config(mut self, config: AccessConfig) -> Self {
        self.config = config;
        self
    }

    /// # Errors
    /// Fails if the writer, search or authorizer is missing, or the config
    /// does not validate.
    pub fn build(self) -> WardenResult<AccessPoint> {
        fn required<T: ?Sized>(value: Option<Arc<T>>, name: &str) -> WardenResult<Arc<T>> {
            value.ok_or_else(|| {
                PolicyError::MissingCollaborator {
                    name: name.to_string(),
                }
                .into()
            })
        }

        self.config.validate()?;
        Ok(AccessPoint {
            writer: required(self.writer, "writer")?,
            search: required(self.search, "search")?,
            reader: self.reader,
            authorizer: required(self.authorizer, "authorizer")?,
            audits: self.audits.unwrap_or_else(|| Arc::new(TracingAuditSink)),
            paths: self.paths,
            locks: self.locks,
            config: self.config,
        })
    }
}

// ============================================================================
// ACCESS POINT
// ============================================================================

pub struct AccessPoint {
    writer: Arc<dyn RecordWriter>,
    search: Arc<dyn RecordSearch>,
    reader: Option<Arc<dyn RecordReader>>,
    authorizer: Arc<dyn AuthorizationProvider>,
    audits: Arc<dyn AuditSink>,
    paths: Option<Arc<dyn PathResolver>>,
    locks: Option<Arc<dyn FieldLockProvider>>,
    config: AccessConfig,
}

impl std::fmt::Debug for AccessPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessPoint")
            .field("reader", &self.reader.is_some())
            .field("paths", &self.paths.is_some())
            .field("locks", &self.locks.is_some())
            .field("config", &self.config)
            .finish()
    }
}

/// ADD for records without populated identity, MODIFY otherwise.
pub fn classify(record: &Record) -> ActionType {
    if record.is_identity_record() {
        ActionType::Modify
    } else {
        ActionType::Add
    }
}

fn verb(action: ActionType) -> String {
    action.to_string().to_lowercase()
}

impl AccessPoint {
    pub fn builder() -> AccessPointBuilder {
        AccessPointBuilder::default()
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    // === Writes ===

    /// Same as [`update`](Self::update); the action is chosen from the record.
    pub fn create(&self, actor: &Record, record: Record) -> Option<Record> {
        self.update(actor, record)
    }

    /// Create or modify `record` if permitted. Returns the persisted record.
    pub fn update(&self, actor: &Record, mut record: Record) -> Option<Record> {
        let action = classify(&record);
        let mut audit = self.open(action, actor);
        audit.resource(&record);

        if action == ActionType::Modify && self.is_locked(actor, &record) {
            debug!(resource = %record.reference_key(), "Write denied by field lock");
            audit.close(ResponseType::Deny, Some(LOCKED_MESSAGE.to_string()));
            return None;
        }

        let decision = self.decide_write(actor, action, &record);
        if !decision.is_permit() {
            debug!(
                action = %action,
                resource = %record.reference_key(),
                decision = ?decision.decision,
                "Write denied"
            );
            audit.close_with(&decision, None);
            return None;
        }

        let written = match action {
            ActionType::Modify => self.writer.update(&record),
            _ => self.writer.create(&mut record),
        };
        match written {
            Ok(true) => {
                audit.resource(&record);
                audit.close(ResponseType::Permit, None);
                Some(record)
            }
            Ok(false) => {
                audit.close(
                    ResponseType::Failed,
                    Some(format!("Failed to {} record", verb(action))),
                );
                None
            }
            Err(e) => {
                error!(action = %action, model = record.model(), error = %e, "Write failed");
                audit.close(
                    ResponseType::Failed,
                    Some(format!("Failed to {} record: {}", verb(action), e)),
                );
                None
            }
        }
    }

    /// Create or modify many records, writing permitted ones in batches.
    ///
    /// Each record gets its own audit, closed with the decision before the
    /// batch is written. Returns the number of records written.
    pub fn update_batch(&self, actor: &Record, records: Vec<Record>) -> usize {
        let mut pending = Vec::new();
        let mut written = 0;

        for record in records {
            let action = classify(&record);
            let mut audit = self.open(action, actor);
            audit.resource(&record);

            if action == ActionType::Modify && self.is_locked(actor, &record) {
                audit.close(ResponseType::Deny, Some(LOCKED_MESSAGE.to_string()));
                continue;
            }
            let decision = self.decide_write(actor, action, &record);
            if !decision.is_permit() {
                audit.close_with(&decision, None);
                continue;
            }
            audit.close(ResponseType::Permit, None);
            pending.push(record);

            if pending.len() >= self.config.maximum_batch_size {
                written += self.flush(&mut pending);
            }
        }
        if !pending.is_empty() {
            written += self.flush(&mut pending);
        }
        written
    }

    pub fn delete(&self, actor: &Record, record: &Record) -> bool {
        let mut audit = self.open(ActionType::Delete, actor);
        audit.resource(record);

        if self.is_locked(actor, record) {
            audit.close(ResponseType::Deny, Some(LOCKED_MESSAGE.to_string()));
            return false;
        }

        let decision = self.authorizer.can_delete(actor, record);
        if !decision.is_permit() {
            debug!(resource = %record.reference_key(), "Delete denied");
            audit.close_with(&decision, None);
            return false;
        }

        match self.writer.delete(record) {
            Ok(true) => {
                audit.close(ResponseType::Permit, None);
                true
            }
            Ok(false) => {
                audit.close(ResponseType::Failed, Some("Failed to delete record".to_string()));
                false
            }
            Err(e) => {
                error!(model = record.model(), error = %e, "Delete failed");
                audit.close(
                    ResponseType::Failed,
                    Some(format!("Failed to delete record: {}", e)),
                );
                false
            }
        }
    }

    // === Reads ===

    /// First record matching `query`, if the query and that record are both readable.
    pub fn find(&self, actor: &Record, query: &Query) -> Option<Record> {
        let mut audit = self.open(ActionType::Read, actor);
        audit.query(&query.model, query.key());

        let decision = self.authorize_query(actor, query);
        if !decision.as_ref().is_some_and(PolicyResponse::is_permit) {
            Self::close_unauthorized(audit, decision, query);
            return None;
        }

        let result = match self.scoped_find(actor, query) {
            Ok(result) => result,
            Err(e) => {
                error!(model = %query.model, error = %e, "Search failed");
                audit.close(ResponseType::Failed, Some(e.to_string()));
                return None;
            }
        };
        self.close_read(audit, actor, result.into_first())
    }

    pub fn find_by_id(&self, actor: &Record, model: &str, id: i64) -> Option<Record> {
        if model.is_empty() || id <= 0 {
            self.fail_audit(actor, "Invalid model or id");
            return None;
        }
        let query = Query::new(model).field(FIELD_ID, id);
        self.find_point(actor, &query, Locator::by_id(model, id))
    }

    pub fn find_by_urn(&self, actor: &Record, model: &str, urn: &str) -> Option<Record> {
        if model.is_empty() || urn.is_empty() {
            self.fail_audit(actor, "Invalid model or urn");
            return None;
        }
        let query = Query::new(model).field(FIELD_URN, urn);
        self.find_point(actor, &query, Locator::by_urn(model, urn))
    }

    pub fn find_by_object_id(&self, actor: &Record, model: &str, object_id: &str) -> Option<Record> {
        if model.is_empty() || object_id.is_empty() {
            self.fail_audit(actor, "Invalid model or objectId");
            return None;
        }
        let query = Query::new(model).field(FIELD_OBJECT_ID, object_id);
        self.find_point(actor, &query, Locator::by_object_id(model, object_id))
    }

    pub fn find_by_name_in_parent(
        &self,
        actor: &Record,
        model: &str,
        parent_id: i64,
        name: &str,
        kind: Option<&str>,
    ) -> Option<Record> {
        let mut query = Query::new(model)
            .field(FIELD_PARENT_ID, parent_id)
            .field(FIELD_NAME, name);
        if let Some(kind) = kind {
            query = query.field(FIELD_TYPE, kind);
        }
        self.find(actor, &query)
    }

    pub fn find_by_name_in_group(
        &self,
        actor: &Record,
        model: &str,
        group_id: i64,
        name: &str,
    ) -> Option<Record> {
        let query = Query::new(model)
            .field(FIELD_GROUP_ID, group_id)
            .field(FIELD_NAME, name);
        self.find(actor, &query)
    }

    /// Resolve an existing record by hierarchical path.
    pub fn find_by_path(
        &self,
        actor: &Record,
        model: &str,
        path: &str,
        kind: Option<&str>,
    ) -> Option<Record> {
        self.resolve_path(actor, model, path, kind, false)
    }

    /// Resolve a record by hierarchical path, creating missing segments.
    pub fn make_path(
        &self,
        actor: &Record,
        model: &str,
        path: &str,
        kind: Option<&str>,
    ) -> Option<Record> {
        self.resolve_path(actor, model, path, kind, true)
    }

    /// All rows matching `query` once every constrained field is readable.
    ///
    /// Returned rows are not individually re-authorized.
    pub fn list(&self, actor: &Record, query: &Query) -> QueryResult {
        let mut audit = self.open(ActionType::Read, actor);
        audit.query(&query.model, query.key());

        let decision = self.authorize_query(actor, query);
        if !decision.as_ref().is_some_and(PolicyResponse::is_permit) {
            Self::close_unauthorized(audit, decision, query);
            return QueryResult::failed(query.clone(), QUERY_NOT_AUTHORIZED);
        }

        match self.scoped_find(actor, query) {
            Ok(result) => {
                audit.close(ResponseType::Permit, None);
                result
            }
            Err(e) => {
                error!(model = %query.model, error = %e, "List failed");
                audit.close(ResponseType::Failed, Some(e.to_string()));
                QueryResult::failed(query.clone(), e.to_string())
            }
        }
    }

    /// Number of rows matching `query`; zero when not authorized.
    pub fn count(&self, actor: &Record, query: &Query) -> u64 {
        let mut audit = self.open(ActionType::Read, actor);
        audit.query(&query.model, query.key());

        let decision = self.authorize_query(actor, query);
        if !decision.as_ref().is_some_and(PolicyResponse::is_permit) {
            Self::close_unauthorized(audit, decision, query);
            return 0;
        }

        match self.search.count(&self.scope(actor, query)) {
            Ok(n) => {
                audit.close(ResponseType::Permit, None);
                n
            }
            Err(e) => {
                error!(model = %query.model, error = %e, "Count failed");
                audit.close(ResponseType::Failed, Some(e.to_string()));
                0
            }
        }
    }

    /// One read decision per constrained field, folded with
    /// [`combine_decisions`]. `None` when the query has no fields.
    pub fn authorize_query(&self, actor: &Record, query: &Query) -> Option<PolicyResponse> {
        if query.fields.is_empty() {
            warn!(model = %query.model, "No policy responses for query without fields");
            return None;
        }
        let decisions: Vec<PolicyResponse> = query
            .fields
            .iter()
            .map(|field| self.authorizer.can_read_field(actor, &query.model, field))
            .collect();
        for denied in decisions.iter().filter(|d| !d.is_permit()) {
            debug!(
                model = %query.model,
                decision = ?denied.decision,
                message = denied.message.as_deref().unwrap_or(""),
                "Query field not authorized"
            );
        }
        combine_decisions(&decisions)
    }

    // === Internals ===

    fn open(&self, action: ActionType, actor: &Record) -> OpenAudit {
        OpenAudit::start(Arc::clone(&self.audits), action, actor)
    }

    fn fail_audit(&self, actor: &Record, message: &str) {
        self.open(ActionType::Read, actor)
            .close(ResponseType::Invalid, Some(message.to_string()));
    }

    fn close_unauthorized(audit: OpenAudit, decision: Option<PolicyResponse>, query: &Query) {
        let message = format!(
            "One or more query fields were not or could not be authorized: {}",
            query.key()
        );
        debug!(model = %query.model, "Query not authorized");
        match decision {
            Some(decision) => audit.close_with(&decision, Some(message)),
            None => audit.close(ResponseType::Deny, Some(message)),
        }
    }

    /// Single-record lookup through the point reader when one is configured.
    ///
    /// Authorized and scoped exactly like [`find`](Self::find) on `query`.
    fn find_point(&self, actor: &Record, query: &Query, locator: Locator) -> Option<Record> {
        let Some(reader) = self.reader.as_ref() else {
            return self.find(actor, query);
        };
        let mut audit = self.open(ActionType::Read, actor);
        audit.query(&query.model, query.key());

        let decision = self.authorize_query(actor, query);
        if !decision.as_ref().is_some_and(PolicyResponse::is_permit) {
            Self::close_unauthorized(audit, decision, query);
            return None;
        }

        match reader.read(&locator) {
            Ok(found) => {
                let found = found.filter(|r| in_organization(actor, r));
                self.close_read(audit, actor, found)
            }
            Err(e) => {
                error!(locator = %locator, error = %e, "Point read failed");
                audit.close(ResponseType::Failed, Some(e.to_string()));
                None
            }
        }
    }

    /// Close a single-record read with the actor's read decision on `found`.
    fn close_read(
        &self,
        mut audit: OpenAudit,
        actor: &Record,
        found: Option<Record>,
    ) -> Option<Record> {
        let Some(top) = found else {
            audit.close(ResponseType::Invalid, Some(NO_RESULTS_MESSAGE.to_string()));
            return None;
        };

        audit.resource(&top);
        let decision = self.authorizer.can_read(actor, &top);
        let permitted = decision.is_permit();
        audit.close_with(&decision, None);
        permitted.then_some(top)
    }

    fn is_locked(&self, actor: &Record, record: &Record) -> bool {
        self.locks
            .as_ref()
            .is_some_and(|locks| locks.is_locked(actor, record))
    }

    fn decide_write(&self, actor: &Record, action: ActionType, record: &Record) -> PolicyResponse {
        match action {
            ActionType::Modify => self.authorizer.can_update(actor, record),
            _ => self.authorizer.can_create(actor, record),
        }
    }

    fn flush(&self, batch: &mut Vec<Record>) -> usize {
        let size = batch.len();
        let written = match self.writer.write_batch(batch) {
            Ok(n) => n,
            Err(e) => {
                error!(size, error = %e, "Batch write failed");
                0
            }
        };
        debug!(size, written, "Batch written");
        batch.clear();
        written
    }

    /// Stamp the actor as context user and, absent an explicit scope, the
    /// actor's organization.
    fn scope(&self, actor: &Record, query: &Query) -> Query {
        let mut scoped = query.clone().with_context_user(actor.reference_key());
        if scoped.org_scope.is_none() {
            if let Some(org) = actor_organization(actor) {
                scoped = scoped.with_org_scope(org);
            }
        }
        scoped
    }

    fn scoped_find(&self, actor: &Record, query: &Query) -> WardenResult<QueryResult> {
        self.search.find(&self.scope(actor, query))
    }

    fn resolve_path(
        &self,
        actor: &Record,
        model: &str,
        path: &str,
        kind: Option<&str>,
        make: bool,
    ) -> Option<Record> {
        let mut audit = self.open(ActionType::Read, actor);
        let organization = actor_organization(actor);
        audit.query(
            model,
            format!(
                "{} {} {} in {}",
                model,
                path,
                kind.unwrap_or(""),
                organization.unwrap_or(0)
            ),
        );

        let Some(resolver) = self.paths.as_ref() else {
            audit.close(ResponseType::Failed, Some("No path resolver configured".to_string()));
            return None;
        };
        let resolved = if make {
            resolver.make_path(actor, model, path, kind, organization)
        } else {
            resolver.find_path(actor, model, path, kind, organization)
        };

        match resolved {
            Ok(Some(record)) => {
                let decision = self.authorizer.can_read(actor, &record);
                let permitted = decision.is_permit();
                if permitted {
                    audit.resource(&record);
                }
                audit.close_with(&decision, None);
                permitted.then_some(record)
            }
            Ok(None) => {
                audit.close(ResponseType::Invalid, Some(NO_RESULTS_MESSAGE.to_string()));
                None
            }
            Err(e) => {
                error!(model, path, error = %e, "Path resolution failed");
                audit.close(ResponseType::Failed, Some(e.to_string()));
                None
            }
        }
    }
}

fn actor_organization(actor: &Record) -> Option<i64> {
    actor
        .get::<i64>(FIELD_ORGANIZATION_ID)
        .ok()
        .filter(|org| *org > 0)
}

/// Whether `record` falls inside the actor's organization scope, matching the
/// scoping [`RecordSearch`] applies to queries.
fn in_organization(actor: &Record, record: &Record) -> bool {
    match actor_organization(actor) {
        Some(org) if record.has_field(FIELD_ORGANIZATION_ID) => {
            record.get::<i64>(FIELD_ORGANIZATION_ID).ok() == Some(org)
        }
        _ => true,
    }
}
