//! Stratum structural model core.
//!
//! Domain objects ("structural elements") live in a containment tree and may
//! additionally declare inheritance edges to other elements in the same
//! repository. Elements carry typed category assignments instantiated from
//! immutable category schemas.
//!
//! ## Module Organization
//!
//! - `schema`: category schemas, property kinds, arities, the `SchemaSet`
//!   registry (acyclicity validated at load)
//! - `instantiate`: builds property-instance trees matching a schema
//! - `instance`: property/category instances, uuid identity, override flags
//! - `array`: the fixed-arity collection over array-typed properties
//! - `element` / `repository`: the containment tree, inheritance edges and
//!   every graph operation, with invariants checked before mutation
//! - `roles`: disciplines and the user registry for edit gating
//!
//! The inheritance propagation pass itself lives in `stratum-engine`; this
//! crate only guarantees the shapes and graph invariants it relies on.

pub mod array;
pub mod element;
pub mod error;
pub mod instance;
pub mod instantiate;
pub mod repository;
pub mod roles;
pub mod schema;

pub use array::ArrayInstance;
pub use element::Element;
pub use error::{GraphRelation, ModelError, ModelResult};
pub use instance::{CategoryInstance, PropertyInstance, PropertyValue, ScalarValue};
pub use instantiate::CategoryInstantiator;
pub use repository::{DeepChildren, ModelObject, Repository};
pub use roles::{Discipline, UserRegistry};
pub use schema::{
    Arity, CategorySchema, PropertyDef, PropertyKind, ScalarKind, SchemaId, SchemaSet,
};
