//! Structural elements: the nodes of the containment tree.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::instance::{CategoryInstance, PropertyInstance};

/// A modeled entity. Containment (`parent`/`children`) forms a tree whose
/// child links own their targets; `supers` is the separate, non-owning
/// inheritance relation, ordered by edge insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Uuid>,
    /// Inheritance sources of this element, in edge-insertion order. The
    /// order is the tie-break for conflicting multi-parent values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supers: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<CategoryInstance>,
    /// Discipline this element is assigned to for role checks, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discipline: Option<String>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            parent: None,
            children: Vec::new(),
            supers: Vec::new(),
            categories: Vec::new(),
            discipline: None,
        }
    }

    /// First category assignment bound to the given schema, if any.
    pub fn category(&self, schema_id: &str) -> Option<&CategoryInstance> {
        self.categories.iter().find(|c| c.schema == schema_id)
    }

    pub fn category_mut(&mut self, schema_id: &str) -> Option<&mut CategoryInstance> {
        self.categories.iter_mut().find(|c| c.schema == schema_id)
    }

    pub fn find_property(&self, uuid: Uuid) -> Option<&PropertyInstance> {
        self.categories.iter().find_map(|c| c.find_property(uuid))
    }

    pub fn find_property_mut(&mut self, uuid: Uuid) -> Option<&mut PropertyInstance> {
        self.categories
            .iter_mut()
            .find_map(|c| c.find_property_mut(uuid))
    }

    pub fn find_category(&self, uuid: Uuid) -> Option<&CategoryInstance> {
        self.categories.iter().find_map(|c| c.find_category(uuid))
    }

    /// Every category/property uuid owned by this element, element uuid first.
    pub fn collect_uuids(&self, out: &mut Vec<Uuid>) {
        out.push(self.uuid);
        for category in &self.categories {
            category.collect_uuids(out);
        }
    }
}
