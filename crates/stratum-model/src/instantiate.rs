//! Category instantiator: builds the property-instance tree for a schema.
//!
//! Instantiation is pure apart from allocating the new subtree; it never
//! touches the element graph. Scalars start unset, references unbound, fixed
//! arrays are filled to their declared size and dynamic arrays start empty.

use crate::error::{ModelError, ModelResult};
use crate::instance::{CategoryInstance, PropertyInstance, PropertyValue};
use crate::schema::{Arity, PropertyDef, PropertyKind, SchemaId, SchemaSet};
use uuid::Uuid;

pub struct CategoryInstantiator<'a> {
    schemas: &'a SchemaSet,
}

impl<'a> CategoryInstantiator<'a> {
    pub fn new(schemas: &'a SchemaSet) -> Self {
        Self { schemas }
    }

    /// Produce a fully populated instance tree for `schema_id`.
    ///
    /// A composition or array that cycles back to a schema already being
    /// instantiated is a fatal `SchemaError`; the visited stack re-checks the
    /// invariant the `SchemaSet` validated at load time, since instances can
    /// also be built against sets deserialized from storage.
    pub fn instantiate(&self, schema_id: &str) -> ModelResult<CategoryInstance> {
        self.instantiate_guarded(schema_id, &mut Vec::new())
    }

    /// Build a single array item of the given kind, used for appends to
    /// dynamic arrays after initial instantiation.
    pub fn instantiate_item(&self, name: &str, kind: &PropertyKind) -> ModelResult<PropertyInstance> {
        let value = self.instantiate_kind(name, kind, &mut Vec::new())?;
        Ok(PropertyInstance::fresh(name.to_string(), value))
    }

    fn instantiate_guarded(
        &self,
        schema_id: &str,
        in_progress: &mut Vec<SchemaId>,
    ) -> ModelResult<CategoryInstance> {
        if in_progress.iter().any(|s| s == schema_id) {
            return Err(ModelError::Schema(format!(
                "cyclic composition through `{schema_id}` during instantiation"
            )));
        }
        let schema = self
            .schemas
            .get(schema_id)
            .ok_or_else(|| ModelError::UnknownSchema(schema_id.to_string()))?;

        in_progress.push(schema_id.to_string());
        let mut properties = Vec::with_capacity(schema.properties.len());
        for def in &schema.properties {
            properties.push(self.instantiate_property(def, in_progress)?);
        }
        in_progress.pop();

        Ok(CategoryInstance {
            uuid: Uuid::new_v4(),
            schema: schema.id.clone(),
            properties,
        })
    }

    fn instantiate_property(
        &self,
        def: &PropertyDef,
        in_progress: &mut Vec<SchemaId>,
    ) -> ModelResult<PropertyInstance> {
        let value = self.instantiate_kind(&def.name, &def.kind, in_progress)?;
        Ok(PropertyInstance::fresh(def.name.clone(), value))
    }

    fn instantiate_kind(
        &self,
        name: &str,
        kind: &PropertyKind,
        in_progress: &mut Vec<SchemaId>,
    ) -> ModelResult<PropertyValue> {
        Ok(match kind {
            PropertyKind::Scalar { scalar } => PropertyValue::Value {
                kind: *scalar,
                value: None,
            },
            PropertyKind::Reference => PropertyValue::Reference { target: None },
            PropertyKind::Composition { schema } => PropertyValue::Composition {
                instance: self.instantiate_guarded(schema, in_progress)?,
            },
            PropertyKind::Array { item, arity } => {
                let mut items = Vec::new();
                if let Arity::Fixed { size } = arity {
                    items.reserve(*size);
                    for _ in 0..*size {
                        let value = self.instantiate_kind(name, item, in_progress)?;
                        items.push(PropertyInstance::fresh(name.to_string(), value));
                    }
                }
                PropertyValue::Array {
                    array: crate::array::ArrayInstance::new(*arity, (**item).clone(), items),
                }
            }
        })
    }
}
