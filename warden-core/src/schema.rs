//! Declarative schema registry.
//!
//! Models are registered once, up front, through [`SchemaRegistryBuilder`].
//! Building the registry resolves each model's inheritance chain, flattens
//! inherited fields, and binds enum fields to their member lists so that
//! assignment-time validation never needs a second lookup.

use crate::error::{SchemaError, StorageError, ValueError};
use crate::{Record, ValueKind};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Key reserved for the model discriminator in serialized records.
pub const MODEL_KEY: &str = "model";

/// Validate a field name against the naming rules shared by schema and records.
pub fn validate_field_name(name: &str) -> Result<(), ValueError> {
    if name.is_empty() {
        return Err(ValueError::EmptyFieldName);
    }
    if name == MODEL_KEY {
        return Err(ValueError::ReservedFieldName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Out-of-line storage for byte payloads of models that declare the capability.
pub trait ByteStore: Send + Sync {
    /// Store `bytes` under `locator`, replacing any previous content.
    fn put(&self, locator: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Fetch the bytes stored under `locator`.
    fn get(&self, locator: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Remove the bytes stored under `locator`. Returns whether anything was removed.
    fn delete(&self, locator: &str) -> Result<bool, StorageError>;
}

/// How a model-typed field constrains the records assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelBinding {
    /// Only records of exactly this model may be assigned.
    Fixed(String),
    /// Binds to whatever model is first assigned.
    Flexible,
}

/// Field definition within a model.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    name: String,
    kind: ValueKind,
    identity: bool,
    immutable: bool,
    enum_type: Option<String>,
    enum_members: Option<Arc<[String]>>,
    binding: Option<ModelBinding>,
    element: Option<ValueKind>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        let binding = (kind == ValueKind::Model).then_some(ModelBinding::Flexible);
        Self {
            name: name.into(),
            kind,
            identity: false,
            immutable: false,
            enum_type: None,
            enum_members: None,
            binding,
            element: None,
        }
    }

    /// Mark as an identity field (addresses a specific instance).
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    /// Mark as immutable once populated.
    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    /// Bind an enum field to a registered enum type.
    pub fn enumeration(mut self, enum_type: impl Into<String>) -> Self {
        self.enum_type = Some(enum_type.into());
        self
    }

    /// Fix a model field to one model.
    pub fn bound_to(mut self, model: impl Into<String>) -> Self {
        self.binding = Some(ModelBinding::Fixed(model.into()));
        self
    }

    /// Constrain list elements to one kind.
    pub fn list_of(mut self, element: ValueKind) -> Self {
        self.element = Some(element);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn is_identity(&self) -> bool {
        self.identity
    }

    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    pub fn enum_type(&self) -> Option<&str> {
        self.enum_type.as_deref()
    }

    pub fn enum_members(&self) -> Option<&[String]> {
        self.enum_members.as_deref()
    }

    pub fn binding(&self) -> Option<&ModelBinding> {
        self.binding.as_ref()
    }

    pub fn element(&self) -> Option<ValueKind> {
        self.element
    }
}

/// Unresolved model declaration handed to the builder.
#[derive(Debug, Clone)]
pub struct ModelDefinition {
    name: String,
    inherits: Vec<String>,
    fields: Vec<FieldDef>,
    byte_store: bool,
}

impl ModelDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inherits: Vec::new(),
            fields: Vec::new(),
            byte_store: false,
        }
    }

    pub fn inherits(mut self, parent: impl Into<String>) -> Self {
        self.inherits.push(parent.into());
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Declare that blob fields of this model live in the byte store.
    pub fn with_byte_store(mut self) -> Self {
        self.byte_store = true;
        self
    }
}

/// Resolved model: flattened fields and full ancestor chain.
#[derive(Debug)]
pub struct ModelSchema {
    name: String,
    ancestors: Vec<String>,
    fields: Vec<Arc<FieldDef>>,
    byte_store: bool,
}

impl ModelSchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ancestor chain, starting with the model itself.
    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    pub fn inherits(&self, model: &str) -> bool {
        self.ancestors.iter().any(|a| a == model)
    }

    pub fn fields(&self) -> &[Arc<FieldDef>] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Arc<FieldDef>> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn identity_fields(&self) -> impl Iterator<Item = &Arc<FieldDef>> {
        self.fields.iter().filter(|f| f.identity)
    }

    pub fn has_byte_store(&self) -> bool {
        self.byte_store
    }
}

/// Registry resolving model names to schemas, enum memberships, and inheritance.
pub struct SchemaRegistry {
    models: HashMap<String, Arc<ModelSchema>>,
    enums: HashMap<String, Arc<[String]>>,
    byte_store: Option<Arc<dyn ByteStore>>,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    pub fn model(&self, name: &str) -> Option<&Arc<ModelSchema>> {
        self.models.get(name)
    }

    pub fn has_model(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn enum_members(&self, enum_type: &str) -> Option<&[String]> {
        self.enums.get(enum_type).map(|m| &m[..])
    }

    /// Ancestor chain for `model`, or an empty slice if unknown.
    pub fn ancestors(&self, model: &str) -> &[String] {
        self.models
            .get(model)
            .map(|m| m.ancestors())
            .unwrap_or(&[])
    }

    pub fn byte_store(&self) -> Option<&Arc<dyn ByteStore>> {
        self.byte_store.as_ref()
    }

    /// Instantiate a new, unpopulated record of `model` with every field at its default.
    pub fn new_record(self: &Arc<Self>, model: &str) -> Result<Record, ValueError> {
        let schema = self
            .models
            .get(model)
            .cloned()
            .ok_or_else(|| ValueError::InvalidModel {
                field: MODEL_KEY.to_string(),
                model: model.to_string(),
            })?;
        Ok(Record::instantiate(Arc::clone(self), schema))
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .field("enums", &self.enums.keys().collect::<Vec<_>>())
            .field("byte_store", &self.byte_store.is_some())
            .finish()
    }
}

/// Builder for [`SchemaRegistry`].
#[derive(Default)]
pub struct SchemaRegistryBuilder {
    definitions: Vec<ModelDefinition>,
    enums: HashMap<String, Arc<[String]>>,
    byte_store: Option<Arc<dyn ByteStore>>,
}

impl SchemaRegistryBuilder {
    pub fn enum_type<I, S>(mut self, name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let members: Vec<String> = members.into_iter().map(Into::into).collect();
        self.enums.insert(name.into(), members.into());
        self
    }

    pub fn model(mut self, definition: ModelDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    pub fn byte_store(mut self, store: Arc<dyn ByteStore>) -> Self {
        self.byte_store = Some(store);
        self
    }

    pub fn build(self) -> Result<Arc<SchemaRegistry>, SchemaError> {
        let mut definitions: HashMap<String, ModelDefinition> = HashMap::new();
        let mut order = Vec::with_capacity(self.definitions.len());
        for def in self.definitions {
            if definitions.contains_key(&def.name) {
                return Err(SchemaError::DuplicateModel { model: def.name });
            }
            order.push(def.name.clone());
            definitions.insert(def.name.clone(), def);
        }

        let mut models = HashMap::with_capacity(order.len());
        for name in &order {
            let ancestors = resolve_ancestors(name, &definitions)?;

            // Inherited fields first, most distant ancestor first; later definitions win.
            let mut fields: Vec<FieldDef> = Vec::new();
            let mut byte_store = false;
            for ancestor in ancestors.iter().rev() {
                let def = &definitions[ancestor];
                byte_store |= def.byte_store;
                for field in &def.fields {
                    match fields.iter_mut().find(|f| f.name == field.name) {
                        Some(existing) => *existing = field.clone(),
                        None => fields.push(field.clone()),
                    }
                }
            }

            let mut resolved = Vec::with_capacity(fields.len());
            for mut field in fields {
                validate_field_name(&field.name).map_err(|source| SchemaError::InvalidField {
                    model: name.clone(),
                    source,
                })?;
                // A boolean always reads as populated, so it cannot tell instances apart.
                if field.identity && field.kind == ValueKind::Boolean {
                    return Err(SchemaError::InvalidIdentityField {
                        model: name.clone(),
                        field: field.name.clone(),
                        kind: field.kind,
                    });
                }
                if field.kind == ValueKind::Enum {
                    let enum_type = field.enum_type.clone().unwrap_or_default();
                    let members = self.enums.get(&enum_type).cloned().ok_or_else(|| {
                        SchemaError::UnknownEnumType {
                            model: name.clone(),
                            field: field.name.clone(),
                            enum_type,
                        }
                    })?;
                    field.enum_members = Some(members);
                }
                if let Some(ModelBinding::Fixed(target)) = &field.binding {
                    if !definitions.contains_key(target) {
                        return Err(SchemaError::UnknownFieldModel {
                            model: name.clone(),
                            field: field.name.clone(),
                            target: target.clone(),
                        });
                    }
                }
                resolved.push(Arc::new(field));
            }

            models.insert(
                name.clone(),
                Arc::new(ModelSchema {
                    name: name.clone(),
                    ancestors,
                    fields: resolved,
                    byte_store,
                }),
            );
        }

        Ok(Arc::new(SchemaRegistry {
            models,
            enums: self.enums,
            byte_store: self.byte_store,
        }))
    }
}

/// Breadth-first ancestor chain starting at `name`, with cycle detection.
fn resolve_ancestors(
    name: &str,
    definitions: &HashMap<String, ModelDefinition>,
) -> Result<Vec<String>, SchemaError> {
    let mut chain = vec![name.to_string()];
    let mut seen: HashSet<String> = HashSet::from([name.to_string()]);
    let mut cursor = 0;
    while cursor < chain.len() {
        let current = chain[cursor].clone();
        let def = definitions
            .get(&current)
            .ok_or_else(|| SchemaError::UnknownParent {
                model: name.to_string(),
                parent: current.clone(),
            })?;
        for parent in &def.inherits {
            if parent == name {
                return Err(SchemaError::InheritanceCycle {
                    model: name.to_string(),
                });
            }
            if !definitions.contains_key(parent) {
                return Err(SchemaError::UnknownParent {
                    model: current.clone(),
                    parent: parent.clone(),
                });
            }
            if seen.insert(parent.clone()) {
                chain.push(parent.clone());
            }
        }
        cursor += 1;
    }
    Ok(chain)
}
