use super::{Operation, OperationContext};
use crate::fact::Fact;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};
use warden_core::names::{FIELD_ID, FIELD_OWNER_ID, FIELD_URN};
use warden_core::{OperationResponse, Query, Record};
use warden_storage::{Locator, RecordReader, RecordSearch};

static NUMERIC_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+$").expect("Invalid ID regex"));

/// Any integer, including ones that can never be a valid id.
fn numeric_id(s: &str) -> Option<i64> {
    if !NUMERIC_ID.is_match(s) {
        return None;
    }
    s.parse::<i64>().ok()
}

/// Checks that a user owns the reference record.
///
/// The source fact names a user, either by numeric id in `data` or by urn.
/// Numeric data that is not a positive id is an error, not a cue to use the
/// urn. The reference fact names the target by urn or numeric id; the target's
/// `ownerId` must equal the user's `id`.
pub struct OwnerOperation {
    reader: Arc<dyn RecordReader>,
    search: Arc<dyn RecordSearch>,
    user_model: String,
}

impl OwnerOperation {
    pub const NAME: &'static str = "owner";

    pub fn new(reader: Arc<dyn RecordReader>, search: Arc<dyn RecordSearch>) -> Self {
        Self {
            reader,
            search,
            user_model: "user".to_string(),
        }
    }

    pub fn with_user_model(mut self, model: impl Into<String>) -> Self {
        self.user_model = model.into();
        self
    }

    fn resolve_source(&self, source: &Fact) -> Option<Record> {
        if let Some(id) = source.data.as_deref().and_then(numeric_id) {
            if id <= 0 {
                debug!(id, "Owner source id is not positive");
                return None;
            }
            let model = source.data_type.as_deref().unwrap_or(&self.user_model);
            return match self.reader.read(&Locator::by_id(model, id)) {
                Ok(found) => found,
                Err(e) => {
                    warn!(error = %e, id, "Owner source read failed");
                    None
                }
            };
        }
        let urn = source.source_urn.as_deref()?;
        self.first(Query::new(self.user_model.as_str()).field(FIELD_URN, urn))
    }

    fn resolve_target(&self, model: &str, reference: &str) -> Option<Record> {
        let query = match numeric_id(reference) {
            Some(id) if id <= 0 => return None,
            Some(id) => Query::new(model).field(FIELD_ID, id),
            None => Query::new(model).field(FIELD_URN, reference),
        };
        self.first(query.select([FIELD_OWNER_ID, FIELD_ID]))
    }

    fn first(&self, query: Query) -> Option<Record> {
        match self.search.find(&query) {
            Ok(result) => result.into_first(),
            Err(e) => {
                warn!(model = %query.model, error = %e, "Owner lookup failed");
                None
            }
        }
    }
}

fn long_or_zero(record: &Record, field: &str) -> i64 {
    record.get::<i64>(field).unwrap_or(0)
}

impl Operation for OwnerOperation {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn evaluate(
        &self,
        source: &Fact,
        reference: &Fact,
        _context: &OperationContext<'_>,
    ) -> OperationResponse {
        if source.model_type.as_deref() != Some(self.user_model.as_str()) {
            debug!(model = ?source.model_type, "Owner source is not a user");
            return OperationResponse::Error;
        }
        let (Some(target_urn), Some(target_model)) =
            (reference.source_urn.as_deref(), reference.model_type.as_deref())
        else {
            debug!("Owner reference is missing urn or type");
            return OperationResponse::Error;
        };

        let Some(user) = self.resolve_source(source) else {
            debug!("Owner source did not resolve");
            return OperationResponse::Error;
        };
        let Some(target) = self.resolve_target(target_model, target_urn) else {
            debug!(model = target_model, reference = target_urn, "Owner target did not resolve");
            return OperationResponse::Error;
        };

        let owner_id = long_or_zero(&user, FIELD_ID);
        let context_id = long_or_zero(&target, FIELD_OWNER_ID);
        if owner_id <= 0 || context_id <= 0 {
            return OperationResponse::Error;
        }
        if owner_id == context_id {
            OperationResponse::Succeeded
        } else {
            OperationResponse::Failed
        }
    }
}
