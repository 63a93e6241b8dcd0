use serde::{Deserialize, Serialize};

/// Minimal assertion evaluated by an [`Operation`](crate::Operation).
///
/// `model_type` names the model the fact refers to, `source_urn` identifies
/// the instance, and `data`/`data_type` carry an optional payload such as a
/// numeric record id and the model it belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub model_type: Option<String>,
    pub source_urn: Option<String>,
    pub data: Option<String>,
    pub data_type: Option<String>,
}

impl Fact {
    pub fn new(model_type: impl Into<String>) -> Self {
        Self {
            model_type: Some(model_type.into()),
            ..Self::default()
        }
    }

    pub fn with_urn(mut self, urn: impl Into<String>) -> Self {
        self.source_urn = Some(urn.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<String>, data_type: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self.data_type = Some(data_type.into());
        self
    }
}
