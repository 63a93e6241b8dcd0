//! A named value slot on a record, validated against its schema definition.

use crate::error::ValueError;
use crate::schema::{FieldDef, ModelBinding, SchemaRegistry};
use crate::{Value, ValueKind};
use std::sync::Arc;

/// Field instance: definition plus current value.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    def: Arc<FieldDef>,
    value: Value,
    /// Model a flexible field bound itself to on first assignment.
    bound_model: Option<String>,
}

impl Field {
    pub(crate) fn new(def: Arc<FieldDef>) -> Self {
        let value = Value::default_for(def.kind());
        Self {
            def,
            value,
            bound_model: None,
        }
    }

    pub fn name(&self) -> &str {
        self.def.name()
    }

    pub fn kind(&self) -> ValueKind {
        self.def.kind()
    }

    pub fn definition(&self) -> &FieldDef {
        &self.def
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_identity(&self) -> bool {
        self.def.is_identity()
    }

    pub fn is_immutable(&self) -> bool {
        self.def.is_immutable()
    }

    pub fn is_populated(&self) -> bool {
        self.value.is_populated()
    }

    /// Model this field currently accepts, if it is constrained to one.
    pub fn bound_model(&self) -> Option<&str> {
        match self.def.binding() {
            Some(ModelBinding::Fixed(model)) => Some(model),
            _ => self.bound_model.as_deref(),
        }
    }

    /// Assign a value. Nothing is coerced except a plain string into an enum slot.
    pub fn set(&mut self, value: Value, registry: &SchemaRegistry) -> Result<(), ValueError> {
        let value = match (self.def.kind(), value) {
            (ValueKind::Enum, Value::String(s)) => Value::Enum(s),
            (_, value) => value,
        };

        if self.def.is_immutable() && self.value.is_populated() && self.value != value {
            return Err(ValueError::ImmutableField {
                field: self.name().to_string(),
            });
        }

        if value.kind() != self.def.kind() {
            return Err(ValueError::TypeMismatch {
                field: self.name().to_string(),
                expected: self.def.kind(),
                got: value.kind(),
            });
        }

        let mut binds_to = None;
        match &value {
            Value::Enum(member) => self.check_enum(member)?,
            Value::List(items) => self.check_list(items)?,
            Value::Model(Some(record)) => binds_to = self.check_model(record.model(), registry)?,
            _ => {}
        }

        if binds_to.is_some() {
            self.bound_model = binds_to;
        }
        self.value = value;
        Ok(())
    }

    fn check_enum(&self, member: &str) -> Result<(), ValueError> {
        let members = self.def.enum_members().unwrap_or(&[]);
        if members.iter().any(|m| m == member) {
            return Ok(());
        }
        Err(ValueError::InvalidEnumValue {
            field: self.name().to_string(),
            enum_type: self.def.enum_type().unwrap_or_default().to_string(),
            value: member.to_string(),
        })
    }

    fn check_list(&self, items: &[Value]) -> Result<(), ValueError> {
        let Some(expected) = self.def.element() else {
            return Ok(());
        };
        match items.iter().position(|item| item.kind() != expected) {
            Some(index) => Err(ValueError::InvalidListElement {
                field: self.name().to_string(),
                index,
                expected,
                got: items[index].kind(),
            }),
            None => Ok(()),
        }
    }

    /// Returns the model to bind to when this is a flexible field's first assignment.
    fn check_model(
        &self,
        model: &str,
        registry: &SchemaRegistry,
    ) -> Result<Option<String>, ValueError> {
        if !registry.has_model(model) {
            return Err(ValueError::InvalidModel {
                field: self.name().to_string(),
                model: model.to_string(),
            });
        }
        match self.bound_model() {
            Some(expected) if expected != model => Err(ValueError::ModelMismatch {
                field: self.name().to_string(),
                expected: expected.to_string(),
                got: model.to_string(),
            }),
            Some(_) => Ok(None),
            None => Ok(Some(model.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ModelDefinition;

    fn registry() -> Arc<SchemaRegistry> {
        SchemaRegistry::builder()
            .enum_type("color", ["Red", "Green"])
            .model(ModelDefinition::new("user").field(FieldDef::new("name", ValueKind::String)))
            .model(ModelDefinition::new("group").field(FieldDef::new("name", ValueKind::String)))
            .build()
            .unwrap()
    }

    fn field(def: FieldDef) -> Field {
        let reg = SchemaRegistry::builder()
            .enum_type("color", ["Red", "Green"])
            .model(ModelDefinition::new("holder").field(def))
            .model(ModelDefinition::new("user"))
            .build()
            .unwrap();
        Field::new(Arc::clone(&reg.model("holder").unwrap().fields()[0]))
    }

    #[test]
    fn test_enum_membership_enforced() {
        let reg = registry();
        let mut f = field(FieldDef::new("color", ValueKind::Enum).enumeration("color"));
        assert!(f.set(Value::from("Red"), &reg).is_ok());
        assert_eq!(f.value(), &Value::Enum("Red".to_string()));

        let err = f.set(Value::Enum("Blue".to_string()), &reg).unwrap_err();
        assert!(matches!(err, ValueError::InvalidEnumValue { .. }));
        assert_eq!(f.value(), &Value::Enum("Red".to_string()));
    }

    #[test]
    fn test_no_numeric_coercion() {
        let reg = registry();
        let mut f = field(FieldDef::new("count", ValueKind::Long));
        let err = f.set(Value::Int(3), &reg).unwrap_err();
        assert_eq!(
            err,
            ValueError::TypeMismatch {
                field: "count".to_string(),
                expected: ValueKind::Long,
                got: ValueKind::Int,
            }
        );
    }

    #[test]
    fn test_list_element_kind_enforced() {
        let reg = registry();
        let mut f = field(FieldDef::new("tags", ValueKind::List).list_of(ValueKind::String));
        let err = f
            .set(Value::List(vec![Value::from("a"), Value::Int(1)]), &reg)
            .unwrap_err();
        assert!(matches!(err, ValueError::InvalidListElement { index: 1, .. }));
    }

    #[test]
    fn test_immutable_field_rejects_change() {
        let reg = registry();
        let mut f = field(FieldDef::new("urn", ValueKind::String).immutable());
        f.set(Value::from("urn:a"), &reg).unwrap();
        assert!(f.set(Value::from("urn:a"), &reg).is_ok());
        let err = f.set(Value::from("urn:b"), &reg).unwrap_err();
        assert!(matches!(err, ValueError::ImmutableField { .. }));
    }

    #[test]
    fn test_fixed_model_mismatch() {
        let reg = registry();
        let mut f = field(FieldDef::new("owner", ValueKind::Model).bound_to("user"));
        let group = reg.new_record("group").unwrap();
        let err = f.set(Value::from(group), &reg).unwrap_err();
        assert!(matches!(err, ValueError::ModelMismatch { .. }));

        let user = reg.new_record("user").unwrap();
        assert!(f.set(Value::from(user), &reg).is_ok());
    }

    #[test]
    fn test_flexible_model_binds_on_first_assignment() {
        let reg = registry();
        let mut f = field(FieldDef::new("subject", ValueKind::Model));
        assert_eq!(f.bound_model(), None);

        f.set(Value::from(reg.new_record("group").unwrap()), &reg)
            .unwrap();
        assert_eq!(f.bound_model(), Some("group"));

        let err = f
            .set(Value::from(reg.new_record("user").unwrap()), &reg)
            .unwrap_err();
        assert!(matches!(err, ValueError::ModelMismatch { .. }));
    }

    #[test]
    fn test_unknown_model_rejected() {
        let reg = registry();
        let other = SchemaRegistry::builder()
            .model(ModelDefinition::new("stranger"))
            .build()
            .unwrap();
        let mut f = field(FieldDef::new("subject", ValueKind::Model));
        let err = f
            .set(Value::from(other.new_record("stranger").unwrap()), &reg)
            .unwrap_err();
        assert!(matches!(err, ValueError::InvalidModel { .. }));
    }
}
