//! Error taxonomy for the structural model.
//!
//! Structural invariant violations (cycles, fixed arity) are rejected before
//! any mutation happens. Data-level inconsistencies found during a bulk pass
//! are represented as `SchemaMismatch` and isolated by the caller.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

pub type ModelResult<T> = Result<T, ModelError>;

/// Which of the two directed relations over elements an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphRelation {
    Containment,
    Inheritance,
}

impl fmt::Display for GraphRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphRelation::Containment => write!(f, "containment"),
            GraphRelation::Inheritance => write!(f, "inheritance"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    /// A containment or inheritance edge would close a directed cycle.
    /// Always rejected at edge-creation time; the graph is left unchanged.
    #[error("{relation} cycle: linking {subject} to {other} would close a loop")]
    Cycle {
        relation: GraphRelation,
        subject: Uuid,
        other: Uuid,
    },

    /// Length mutation attempted on a fixed-arity array.
    #[error("length change on fixed-arity array of size {size}")]
    UnsupportedStructuralChange { size: usize },

    /// Subject and source disagree on category shape during inheritance.
    /// Recoverable per category instance; fatal from the instantiator.
    #[error("schema mismatch on {subject}: {detail}")]
    SchemaMismatch { subject: Uuid, detail: String },

    /// A stored identifier no longer resolves to a live object. Surfaced at
    /// the point of dereference, never at deletion time.
    #[error("dangling reference: {0} does not resolve to a live object")]
    DanglingReference(Uuid),

    /// Malformed schema definitions (cyclic compositions, unresolvable ids,
    /// duplicate identifiers in a loaded document). Fatal for the whole set.
    #[error("schema error: {0}")]
    Schema(String),

    #[error("unknown category schema `{0}`")]
    UnknownSchema(String),

    /// Re-parenting requires an explicit detach first.
    #[error("element {child} already has a parent; detach it first")]
    AlreadyParented { child: Uuid },

    /// The inheritance edge is already present; adding it again is redundant,
    /// not cyclic.
    #[error("inheritance edge {subject} -> {source_id} already exists")]
    DuplicateEdge { subject: Uuid, source_id: Uuid },

    /// Lookup by uuid found no element, category instance or property
    /// instance anywhere in the repository.
    #[error("no model object with uuid {0}")]
    NotFound(Uuid),

    #[error("expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("index {index} out of bounds for array of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Role check failure: the active user is not part of the discipline the
    /// element is assigned to.
    #[error("user `{user}` is not a member of discipline `{discipline}`")]
    AccessDenied { user: String, discipline: String },
}
