//! Category schemas: the static description of a record type.
//!
//! A `CategorySchema` declares named, typed properties. Kinds form a closed
//! universe: scalars, references, nested compositions and arrays-of-kind with
//! fixed or dynamic arity. Schemas are immutable once registered in a
//! `SchemaSet`; registration validates that every composition target resolves
//! and that the schema reference graph is acyclic.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

pub type SchemaId = String;

// ============================================================================
// Kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Int,
    Float,
    Bool,
    String,
    /// Path-valued scalar pointing at a file resource attached to the model.
    Resource,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarKind::Int => write!(f, "int"),
            ScalarKind::Float => write!(f, "float"),
            ScalarKind::Bool => write!(f, "bool"),
            ScalarKind::String => write!(f, "string"),
            ScalarKind::Resource => write!(f, "resource"),
        }
    }
}

/// Whether an array property has an immutable or a mutable length.
///
/// `Fixed { size }` arrays hold exactly `size` items for the whole lifetime
/// of every instance created from the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "arity", rename_all = "snake_case")]
pub enum Arity {
    Fixed { size: usize },
    Dynamic,
}

impl Arity {
    pub fn is_fixed(&self) -> bool {
        matches!(self, Arity::Fixed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyKind {
    Scalar { scalar: ScalarKind },
    Reference,
    Composition { schema: SchemaId },
    Array { item: Box<PropertyKind>, arity: Arity },
}

impl PropertyKind {
    /// Schema ids this kind refers to, transitively through array nesting.
    fn referenced_schemas<'a>(&'a self, out: &mut Vec<&'a SchemaId>) {
        match self {
            PropertyKind::Scalar { .. } | PropertyKind::Reference => {}
            PropertyKind::Composition { schema } => out.push(schema),
            PropertyKind::Array { item, .. } => item.referenced_schemas(out),
        }
    }
}

// ============================================================================
// Schemas
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub kind: PropertyKind,
}

/// Immutable record-type description, identified by a fully qualified id
/// (e.g. `equipment.PowerParameters`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySchema {
    pub id: SchemaId,
    pub name: String,
    pub properties: Vec<PropertyDef>,
}

impl CategorySchema {
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }
}

// ============================================================================
// Schema set
// ============================================================================

/// Registry of the category schemas active in a repository.
///
/// Loading is all-or-nothing: a cyclic composition or an unresolvable schema
/// reference aborts the whole set with `ModelError::Schema`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSet {
    schemas: BTreeMap<SchemaId, CategorySchema>,
}

impl SchemaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from a batch of schema definitions, validating the batch
    /// as a whole.
    pub fn load(schemas: Vec<CategorySchema>) -> ModelResult<Self> {
        let mut set = Self::new();
        for schema in schemas {
            if set.schemas.contains_key(&schema.id) {
                return Err(ModelError::Schema(format!(
                    "duplicate category schema id `{}`",
                    schema.id
                )));
            }
            set.schemas.insert(schema.id.clone(), schema);
        }
        set.validate()?;
        Ok(set)
    }

    /// Register one more schema into an already valid set.
    pub fn register(&mut self, schema: CategorySchema) -> ModelResult<()> {
        if self.schemas.contains_key(&schema.id) {
            return Err(ModelError::Schema(format!(
                "duplicate category schema id `{}`",
                schema.id
            )));
        }
        let id = schema.id.clone();
        self.schemas.insert(id.clone(), schema);
        if let Err(err) = self.validate() {
            self.schemas.remove(&id);
            return Err(err);
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&CategorySchema> {
        self.schemas.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.schemas.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategorySchema> {
        self.schemas.values()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Check that every composition target resolves and that the composition
    /// graph over schemas is acyclic.
    pub fn validate(&self) -> ModelResult<()> {
        for schema in self.schemas.values() {
            let mut refs = Vec::new();
            for def in &schema.properties {
                def.kind.referenced_schemas(&mut refs);
            }
            for id in refs {
                if !self.schemas.contains_key(id) {
                    return Err(ModelError::Schema(format!(
                        "`{}` composes unknown schema `{}`",
                        schema.id, id
                    )));
                }
            }
        }

        // DFS cycle detection over the composition references.
        let mut done: HashSet<&SchemaId> = HashSet::new();
        for start in self.schemas.keys() {
            if done.contains(start) {
                continue;
            }
            self.walk_acyclic(start, &mut Vec::new(), &mut done)?;
        }
        Ok(())
    }

    fn walk_acyclic<'a>(
        &'a self,
        id: &'a SchemaId,
        stack: &mut Vec<&'a SchemaId>,
        done: &mut HashSet<&'a SchemaId>,
    ) -> ModelResult<()> {
        if stack.contains(&id) {
            return Err(ModelError::Schema(format!(
                "cyclic composition through `{id}`"
            )));
        }
        if done.contains(id) {
            return Ok(());
        }
        stack.push(id);
        let schema = &self.schemas[id];
        let mut refs = Vec::new();
        for def in &schema.properties {
            def.kind.referenced_schemas(&mut refs);
        }
        for next in refs {
            self.walk_acyclic(next, stack, done)?;
        }
        stack.pop();
        done.insert(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(name: &str, kind: ScalarKind) -> PropertyDef {
        PropertyDef {
            name: name.to_string(),
            kind: PropertyKind::Scalar { scalar: kind },
        }
    }

    fn composition(name: &str, schema: &str) -> PropertyDef {
        PropertyDef {
            name: name.to_string(),
            kind: PropertyKind::Composition {
                schema: schema.to_string(),
            },
        }
    }

    fn schema(id: &str, properties: Vec<PropertyDef>) -> CategorySchema {
        CategorySchema {
            id: id.to_string(),
            name: id.rsplit('.').next().unwrap_or(id).to_string(),
            properties,
        }
    }

    #[test]
    fn load_resolves_compositions() {
        let set = SchemaSet::load(vec![
            schema("a.Inner", vec![scalar("x", ScalarKind::Int)]),
            schema("a.Outer", vec![composition("inner", "a.Inner")]),
        ])
        .unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("a.Outer"));
    }

    #[test]
    fn load_rejects_unknown_composition_target() {
        let err = SchemaSet::load(vec![schema(
            "a.Outer",
            vec![composition("inner", "a.Missing")],
        )])
        .unwrap_err();
        assert!(matches!(err, ModelError::Schema(_)));
    }

    #[test]
    fn load_rejects_cyclic_compositions() {
        let err = SchemaSet::load(vec![
            schema("a.A", vec![composition("b", "a.B")]),
            schema("a.B", vec![composition("a", "a.A")]),
        ])
        .unwrap_err();
        assert!(matches!(err, ModelError::Schema(_)));
    }

    #[test]
    fn load_rejects_self_composition() {
        let err =
            SchemaSet::load(vec![schema("a.A", vec![composition("a", "a.A")])]).unwrap_err();
        assert!(matches!(err, ModelError::Schema(_)));
    }

    #[test]
    fn cyclic_array_of_composition_is_rejected() {
        let err = SchemaSet::load(vec![schema(
            "a.A",
            vec![PropertyDef {
                name: "nested".to_string(),
                kind: PropertyKind::Array {
                    item: Box::new(PropertyKind::Composition {
                        schema: "a.A".to_string(),
                    }),
                    arity: Arity::Dynamic,
                },
            }],
        )])
        .unwrap_err();
        assert!(matches!(err, ModelError::Schema(_)));
    }

    #[test]
    fn register_rolls_back_on_invalid_addition() {
        let mut set =
            SchemaSet::load(vec![schema("a.A", vec![scalar("x", ScalarKind::Int)])]).unwrap();
        let err = set
            .register(schema("a.B", vec![composition("gone", "a.Missing")]))
            .unwrap_err();
        assert!(matches!(err, ModelError::Schema(_)));
        assert!(!set.contains("a.B"));
    }

    #[test]
    fn kind_serde_is_tagged() {
        let kind = PropertyKind::Array {
            item: Box::new(PropertyKind::Scalar {
                scalar: ScalarKind::Float,
            }),
            arity: Arity::Fixed { size: 3 },
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["kind"], "array");
        assert_eq!(json["arity"]["arity"], "fixed");
        assert_eq!(json["arity"]["size"], 3);
        let back: PropertyKind = serde_json::from_value(json).unwrap();
        assert_eq!(back, kind);
    }
}
