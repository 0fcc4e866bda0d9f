//! Instantiated category data: the value holders created from a schema.
//!
//! The value side mirrors the kind side of `schema` as a closed tagged union,
//! so every consumer gets exhaustive handling at compile time instead of the
//! open subclassing of property "beans".
//!
//! Every instance carries a stable uuid. Cross-references are stored as
//! uuids and resolved against the owning repository, never by structural
//! position.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::array::ArrayInstance;
use crate::error::{ModelError, ModelResult};
use crate::schema::{CategorySchema, PropertyKind, ScalarKind, SchemaId, SchemaSet};

// ============================================================================
// Scalar values
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ScalarValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    /// Workspace-relative path of an attached file resource.
    Resource(String),
}

impl ScalarValue {
    pub fn kind(&self) -> ScalarKind {
        match self {
            ScalarValue::Int(_) => ScalarKind::Int,
            ScalarValue::Float(_) => ScalarKind::Float,
            ScalarValue::Bool(_) => ScalarKind::Bool,
            ScalarValue::String(_) => ScalarKind::String,
            ScalarValue::Resource(_) => ScalarKind::Resource,
        }
    }
}

// ============================================================================
// Property instances
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyValue {
    /// Scalar slot. `None` means unset, which is distinct from any set value
    /// (including zero); the declared kind is kept alongside so an unset slot
    /// still knows its type.
    Value {
        kind: ScalarKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<ScalarValue>,
    },
    /// Weak link to another model object, initially unbound.
    Reference {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<Uuid>,
    },
    /// Nested category instance, exclusively owned by the composing property.
    Composition { instance: CategoryInstance },
    Array { array: ArrayInstance },
}

impl PropertyValue {
    /// Short label used in mismatch diagnostics.
    pub fn describe(&self) -> String {
        match self {
            PropertyValue::Value { kind, .. } => format!("{kind} value"),
            PropertyValue::Reference { .. } => "reference".to_string(),
            PropertyValue::Composition { instance } => {
                format!("composition of `{}`", instance.schema)
            }
            PropertyValue::Array { array } => format!("array of length {}", array.len()),
        }
    }
}

/// A single instantiated property slot.
///
/// `override` decides whether the inheritance pass may overwrite the stored
/// value; it is meaningful only for instances reachable through an
/// inheritance chain and defaults to off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyInstance {
    pub uuid: Uuid,
    pub name: String,
    #[serde(rename = "override", default, skip_serializing_if = "std::ops::Not::not")]
    pub overridden: bool,
    pub value: PropertyValue,
}

impl PropertyInstance {
    pub(crate) fn fresh(name: String, value: PropertyValue) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name,
            overridden: false,
            value,
        }
    }

    /// Whether a scalar slot holds a value. Unset is not the same as zero.
    pub fn is_set(&self) -> bool {
        matches!(
            &self.value,
            PropertyValue::Value { value: Some(_), .. }
        )
    }

    /// Clear a scalar slot back to unset.
    pub fn unset(&mut self) -> ModelResult<()> {
        match &mut self.value {
            PropertyValue::Value { value, .. } => {
                *value = None;
                Ok(())
            }
            other => Err(ModelError::TypeMismatch {
                expected: "scalar value slot".to_string(),
                actual: other.describe(),
            }),
        }
    }

    /// Replace the scalar value, checking it against the declared kind.
    pub fn set_scalar(&mut self, new: Option<ScalarValue>) -> ModelResult<()> {
        match &mut self.value {
            PropertyValue::Value { kind, value } => {
                if let Some(v) = &new {
                    if v.kind() != *kind {
                        return Err(ModelError::TypeMismatch {
                            expected: kind.to_string(),
                            actual: v.kind().to_string(),
                        });
                    }
                }
                *value = new;
                Ok(())
            }
            other => Err(ModelError::TypeMismatch {
                expected: "scalar value slot".to_string(),
                actual: other.describe(),
            }),
        }
    }

    /// Rebind a reference slot.
    pub fn set_reference(&mut self, target: Option<Uuid>) -> ModelResult<()> {
        match &mut self.value {
            PropertyValue::Reference { target: slot } => {
                *slot = target;
                Ok(())
            }
            other => Err(ModelError::TypeMismatch {
                expected: "reference slot".to_string(),
                actual: other.describe(),
            }),
        }
    }

    /// Find a property instance by uuid within this subtree, including
    /// array items and composed instances.
    pub fn find_property(&self, uuid: Uuid) -> Option<&PropertyInstance> {
        if self.uuid == uuid {
            return Some(self);
        }
        match &self.value {
            PropertyValue::Composition { instance } => instance.find_property(uuid),
            PropertyValue::Array { array } => {
                array.iter().find_map(|item| item.find_property(uuid))
            }
            _ => None,
        }
    }

    pub fn find_property_mut(&mut self, uuid: Uuid) -> Option<&mut PropertyInstance> {
        if self.uuid == uuid {
            return Some(self);
        }
        match &mut self.value {
            PropertyValue::Composition { instance } => instance.find_property_mut(uuid),
            PropertyValue::Array { array } => array
                .iter_mut()
                .find_map(|item| item.find_property_mut(uuid)),
            _ => None,
        }
    }

    /// Find a nested category instance by uuid within this subtree.
    pub fn find_category(&self, uuid: Uuid) -> Option<&CategoryInstance> {
        match &self.value {
            PropertyValue::Composition { instance } => instance.find_category(uuid),
            PropertyValue::Array { array } => {
                array.iter().find_map(|item| item.find_category(uuid))
            }
            _ => None,
        }
    }

    /// Collect every uuid in this subtree (self, array items, compositions).
    pub fn collect_uuids(&self, out: &mut Vec<Uuid>) {
        out.push(self.uuid);
        match &self.value {
            PropertyValue::Composition { instance } => instance.collect_uuids(out),
            PropertyValue::Array { array } => {
                for item in array.iter() {
                    item.collect_uuids(out);
                }
            }
            _ => {}
        }
    }

    fn conforms_to_kind(&self, kind: &PropertyKind, schemas: &SchemaSet) -> ModelResult<()> {
        match (kind, &self.value) {
            (PropertyKind::Scalar { scalar }, PropertyValue::Value { kind, value }) => {
                if kind != scalar {
                    return Err(mismatch(self.uuid, scalar.to_string(), kind.to_string()));
                }
                if let Some(v) = value {
                    if v.kind() != *scalar {
                        return Err(mismatch(
                            self.uuid,
                            scalar.to_string(),
                            v.kind().to_string(),
                        ));
                    }
                }
                Ok(())
            }
            (PropertyKind::Reference, PropertyValue::Reference { .. }) => Ok(()),
            (PropertyKind::Composition { schema }, PropertyValue::Composition { instance }) => {
                if &instance.schema != schema {
                    return Err(mismatch(
                        self.uuid,
                        format!("composition of `{schema}`"),
                        format!("composition of `{}`", instance.schema),
                    ));
                }
                instance.conforms_to(schemas)
            }
            (PropertyKind::Array { item, arity }, PropertyValue::Array { array }) => {
                if array.arity() != *arity {
                    return Err(mismatch(
                        self.uuid,
                        format!("{arity:?} array"),
                        format!("{:?} array", array.arity()),
                    ));
                }
                if array.item_kind() != &**item {
                    return Err(mismatch(
                        self.uuid,
                        "array item kind matching the schema".to_string(),
                        "different item kind".to_string(),
                    ));
                }
                if let crate::schema::Arity::Fixed { size } = arity {
                    if array.len() != *size {
                        return Err(mismatch(
                            self.uuid,
                            format!("array of length {size}"),
                            format!("array of length {}", array.len()),
                        ));
                    }
                }
                for entry in array.iter() {
                    entry.conforms_to_kind(item, schemas)?;
                }
                Ok(())
            }
            (expected, actual) => Err(mismatch(
                self.uuid,
                format!("{expected:?}"),
                actual.describe(),
            )),
        }
    }
}

fn mismatch(subject: Uuid, expected: String, actual: String) -> ModelError {
    ModelError::SchemaMismatch {
        subject,
        detail: format!("expected {expected}, found {actual}"),
    }
}

// ============================================================================
// Category instances
// ============================================================================

/// One category assignment: a schema bound to its instantiated properties,
/// one `PropertyInstance` per `PropertyDef` in schema order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryInstance {
    pub uuid: Uuid,
    pub schema: SchemaId,
    pub properties: Vec<PropertyInstance>,
}

impl CategoryInstance {
    pub fn property(&self, name: &str) -> Option<&PropertyInstance> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn property_mut(&mut self, name: &str) -> Option<&mut PropertyInstance> {
        self.properties.iter_mut().find(|p| p.name == name)
    }

    pub fn find_property(&self, uuid: Uuid) -> Option<&PropertyInstance> {
        self.properties.iter().find_map(|p| p.find_property(uuid))
    }

    pub fn find_property_mut(&mut self, uuid: Uuid) -> Option<&mut PropertyInstance> {
        self.properties
            .iter_mut()
            .find_map(|p| p.find_property_mut(uuid))
    }

    pub fn find_category(&self, uuid: Uuid) -> Option<&CategoryInstance> {
        if self.uuid == uuid {
            return Some(self);
        }
        self.properties.iter().find_map(|p| p.find_category(uuid))
    }

    pub fn collect_uuids(&self, out: &mut Vec<Uuid>) {
        out.push(self.uuid);
        for property in &self.properties {
            property.collect_uuids(out);
        }
    }

    /// Structural conformance against the declaring schema: property names
    /// in schema order, kinds and arities matching, recursively.
    pub fn conforms_to(&self, schemas: &SchemaSet) -> ModelResult<()> {
        let schema: &CategorySchema = schemas
            .get(&self.schema)
            .ok_or_else(|| ModelError::UnknownSchema(self.schema.clone()))?;
        if schema.properties.len() != self.properties.len() {
            return Err(mismatch(
                self.uuid,
                format!("{} properties", schema.properties.len()),
                format!("{} properties", self.properties.len()),
            ));
        }
        for (def, instance) in schema.properties.iter().zip(&self.properties) {
            if def.name != instance.name {
                return Err(mismatch(
                    self.uuid,
                    format!("property `{}`", def.name),
                    format!("property `{}`", instance.name),
                ));
            }
            instance.conforms_to_kind(&def.kind, schemas)?;
        }
        Ok(())
    }
}
