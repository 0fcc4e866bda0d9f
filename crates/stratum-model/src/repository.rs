//! Repository: the root container owning every structural element.
//!
//! One uuid-keyed table holds all elements across all containment trees;
//! `roots` lists the tree roots. Since the identifier space is global,
//! references and inheritance edges may cross tree boundaries.
//!
//! All graph mutations validate their structural invariants *before*
//! touching any state: a rejected operation leaves the repository unchanged.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::element::Element;
use crate::error::{GraphRelation, ModelError, ModelResult};
use crate::instance::{CategoryInstance, PropertyInstance};
use crate::instantiate::CategoryInstantiator;
use crate::schema::SchemaSet;

/// Result of a uuid lookup: any addressable model object.
#[derive(Debug)]
pub enum ModelObject<'a> {
    Element(&'a Element),
    Category(&'a CategoryInstance),
    Property(&'a PropertyInstance),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    /// Category schemas active in this repository. Serialized with the
    /// repository so one document round-trips the whole model.
    pub active_schemas: SchemaSet,
    elements: BTreeMap<Uuid, Element>,
    roots: Vec<Uuid>,
}

impl Repository {
    pub fn new(active_schemas: SchemaSet) -> Self {
        Self {
            active_schemas,
            elements: BTreeMap::new(),
            roots: Vec::new(),
        }
    }

    // ========================================================================
    // Element access
    // ========================================================================

    /// Dereference an element uuid. A uuid that no longer resolves (for
    /// example after a cascading removal) is a dangling reference and is
    /// reported here, at the point of dereference.
    pub fn element(&self, uuid: Uuid) -> ModelResult<&Element> {
        self.elements
            .get(&uuid)
            .ok_or(ModelError::DanglingReference(uuid))
    }

    pub fn element_mut(&mut self, uuid: Uuid) -> ModelResult<&mut Element> {
        self.elements
            .get_mut(&uuid)
            .ok_or(ModelError::DanglingReference(uuid))
    }

    pub fn contains(&self, uuid: Uuid) -> bool {
        self.elements.contains_key(&uuid)
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    pub fn element_uuids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.elements.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn roots(&self) -> &[Uuid] {
        &self.roots
    }

    // ========================================================================
    // Element lifecycle
    // ========================================================================

    /// Create a fresh, unattached element. Attach it with `add_root` or
    /// `add_child` afterwards.
    pub fn create_element(&mut self, name: impl Into<String>) -> Uuid {
        let element = Element::new(name);
        let uuid = element.uuid;
        self.elements.insert(uuid, element);
        uuid
    }

    /// Insert a prepared element. Used by the command layer, which picks the
    /// uuid up front so its log can name what was created.
    pub fn insert_element(&mut self, element: Element) -> ModelResult<()> {
        if self.elements.contains_key(&element.uuid) {
            return Err(ModelError::Schema(format!(
                "duplicate element uuid {}",
                element.uuid
            )));
        }
        self.elements.insert(element.uuid, element);
        Ok(())
    }

    /// Promote an unattached element to a containment-tree root.
    pub fn add_root(&mut self, uuid: Uuid) -> ModelResult<()> {
        if self.element(uuid)?.parent.is_some() {
            return Err(ModelError::AlreadyParented { child: uuid });
        }
        if !self.roots.contains(&uuid) {
            self.roots.push(uuid);
        }
        Ok(())
    }

    /// Remove an element and its whole containment subtree. Inheritance
    /// edges and references pointing into the removed subtree are left in
    /// place; dereferencing them later fails with `DanglingReference`.
    ///
    /// Returns the removed uuids, subtree root first.
    pub fn remove_element(&mut self, uuid: Uuid) -> ModelResult<Vec<Uuid>> {
        self.element(uuid)?;

        let mut removed = vec![uuid];
        removed.extend(self.deep_children(uuid));

        if let Some(parent) = self.elements[&uuid].parent {
            if let Some(parent_el) = self.elements.get_mut(&parent) {
                parent_el.children.retain(|c| *c != uuid);
            }
        }
        self.roots.retain(|r| *r != uuid);

        for gone in &removed {
            self.elements.remove(gone);
        }
        Ok(removed)
    }

    // ========================================================================
    // Containment
    // ========================================================================

    /// Attach `child` under `parent`. Containment must stay a tree: the call
    /// is rejected if it would introduce a cycle, and re-parenting requires
    /// an explicit `detach_child` first.
    pub fn add_child(&mut self, parent: Uuid, child: Uuid) -> ModelResult<()> {
        self.element(parent)?;
        let child_el = self.element(child)?;

        match child_el.parent {
            Some(existing) if existing == parent => return Ok(()),
            Some(_) => return Err(ModelError::AlreadyParented { child }),
            None => {}
        }
        if parent == child || self.is_ancestor(child, parent) {
            return Err(ModelError::Cycle {
                relation: GraphRelation::Containment,
                subject: parent,
                other: child,
            });
        }

        self.roots.retain(|r| *r != child);
        self.elements.get_mut(&child).expect("checked above").parent = Some(parent);
        self.elements
            .get_mut(&parent)
            .expect("checked above")
            .children
            .push(child);
        Ok(())
    }

    /// Detach `child` from `parent`, leaving it unattached (not a root).
    pub fn detach_child(&mut self, parent: Uuid, child: Uuid) -> ModelResult<()> {
        self.element(parent)?;
        let child_el = self.element(child)?;
        if child_el.parent != Some(parent) {
            return Err(ModelError::NotFound(child));
        }
        self.elements.get_mut(&child).expect("checked above").parent = None;
        self.elements
            .get_mut(&parent)
            .expect("checked above")
            .children
            .retain(|c| *c != child);
        Ok(())
    }

    /// Whether `candidate` is a (transitive) containment ancestor of `of`.
    pub fn is_ancestor(&self, candidate: Uuid, of: Uuid) -> bool {
        let mut seen = HashSet::new();
        let mut current = self.elements.get(&of).and_then(|e| e.parent);
        while let Some(uuid) = current {
            if uuid == candidate {
                return true;
            }
            if !seen.insert(uuid) {
                break;
            }
            current = self.elements.get(&uuid).and_then(|e| e.parent);
        }
        false
    }

    /// Lazy pre-order traversal of all transitive containment descendants.
    /// The iterator reads the live tree, so re-querying after edits reflects
    /// the current state rather than a snapshot.
    pub fn deep_children(&self, uuid: Uuid) -> DeepChildren<'_> {
        let mut stack = Vec::new();
        if let Some(element) = self.elements.get(&uuid) {
            stack.extend(element.children.iter().rev().copied());
        }
        DeepChildren { repo: self, stack }
    }

    // ========================================================================
    // Inheritance edges
    // ========================================================================

    /// Add the inheritance edge `subject -> source`. Rejected when the edge
    /// already exists or when it would make the inheritance relation cyclic;
    /// the graph is unchanged on rejection.
    pub fn add_inheritance_edge(&mut self, subject: Uuid, source: Uuid) -> ModelResult<()> {
        let subject_el = self.element(subject)?;
        self.element(source)?;

        if subject_el.supers.contains(&source) {
            return Err(ModelError::DuplicateEdge { subject, source_id: source });
        }
        if subject == source || self.inherits_transitively(source, subject) {
            return Err(ModelError::Cycle {
                relation: GraphRelation::Inheritance,
                subject,
                other: source,
            });
        }

        self.elements
            .get_mut(&subject)
            .expect("checked above")
            .supers
            .push(source);
        Ok(())
    }

    pub fn remove_inheritance_edge(&mut self, subject: Uuid, source: Uuid) -> ModelResult<()> {
        let subject_el = self.element_mut(subject)?;
        let before = subject_el.supers.len();
        subject_el.supers.retain(|s| *s != source);
        if subject_el.supers.len() == before {
            return Err(ModelError::NotFound(source));
        }
        Ok(())
    }

    /// Whether `subject` reaches `target` through inheritance edges.
    pub fn inherits_transitively(&self, subject: Uuid, target: Uuid) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![subject];
        while let Some(uuid) = stack.pop() {
            if uuid == target {
                return true;
            }
            if !seen.insert(uuid) {
                continue;
            }
            if let Some(element) = self.elements.get(&uuid) {
                stack.extend(element.supers.iter().copied());
            }
        }
        false
    }

    // ========================================================================
    // Category assignments
    // ========================================================================

    /// Instantiate the schema and attach the new category instance to the
    /// element. Returns the uuid of the created instance.
    pub fn attach_category(&mut self, element: Uuid, schema_id: &str) -> ModelResult<Uuid> {
        self.element(element)?;
        let instance = CategoryInstantiator::new(&self.active_schemas).instantiate(schema_id)?;
        let uuid = instance.uuid;
        self.elements
            .get_mut(&element)
            .expect("checked above")
            .categories
            .push(instance);
        Ok(uuid)
    }

    /// Remove a category assignment, destroying its property instances.
    pub fn remove_category(&mut self, element: Uuid, category: Uuid) -> ModelResult<()> {
        let element = self.element_mut(element)?;
        let before = element.categories.len();
        element.categories.retain(|c| c.uuid != category);
        if element.categories.len() == before {
            return Err(ModelError::NotFound(category));
        }
        Ok(())
    }

    // ========================================================================
    // Uuid resolution
    // ========================================================================

    /// Resolve any addressable object — element, category instance or
    /// property instance — by its uuid.
    pub fn get_by_uuid(&self, uuid: Uuid) -> ModelResult<ModelObject<'_>> {
        for element in self.elements.values() {
            if element.uuid == uuid {
                return Ok(ModelObject::Element(element));
            }
            if let Some(category) = element.find_category(uuid) {
                return Ok(ModelObject::Category(category));
            }
            if let Some(property) = element.find_property(uuid) {
                return Ok(ModelObject::Property(property));
            }
        }
        Err(ModelError::NotFound(uuid))
    }

    pub fn find_property(&self, uuid: Uuid) -> ModelResult<&PropertyInstance> {
        self.elements
            .values()
            .find_map(|e| e.find_property(uuid))
            .ok_or(ModelError::NotFound(uuid))
    }

    pub fn find_property_mut(&mut self, uuid: Uuid) -> ModelResult<&mut PropertyInstance> {
        self.elements
            .values_mut()
            .find_map(|e| e.find_property_mut(uuid))
            .ok_or(ModelError::NotFound(uuid))
    }

    /// The element owning the object with the given uuid, if any.
    pub fn find_owner(&self, uuid: Uuid) -> Option<&Element> {
        self.elements.values().find(|element| {
            element.uuid == uuid
                || element.find_category(uuid).is_some()
                || element.find_property(uuid).is_some()
        })
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Re-check every structural invariant. Used after deserializing a
    /// repository document, where stored state may have been edited outside
    /// the graph API.
    pub fn validate(&self) -> ModelResult<()> {
        // Roots exist and are parentless.
        for root in &self.roots {
            let element = self.element(*root)?;
            if element.parent.is_some() {
                return Err(ModelError::Schema(format!(
                    "root element {root} has a parent"
                )));
            }
        }

        // Parent/child symmetry and containment acyclicity.
        for element in self.elements.values() {
            for child in &element.children {
                let child_el = self.element(*child)?;
                if child_el.parent != Some(element.uuid) {
                    return Err(ModelError::Schema(format!(
                        "containment link {} -> {child} is not mirrored by the child",
                        element.uuid
                    )));
                }
            }
            if let Some(parent) = element.parent {
                let parent_el = self.element(parent)?;
                if !parent_el.children.contains(&element.uuid) {
                    return Err(ModelError::Schema(format!(
                        "element {} names parent {parent} that does not list it",
                        element.uuid
                    )));
                }
            }
            if self.is_ancestor(element.uuid, element.uuid) {
                return Err(ModelError::Cycle {
                    relation: GraphRelation::Containment,
                    subject: element.uuid,
                    other: element.uuid,
                });
            }
        }

        // Inheritance sources exist; the relation is acyclic.
        for element in self.elements.values() {
            for source in &element.supers {
                self.element(*source)?;
            }
            if element.supers.contains(&element.uuid)
                || element
                    .supers
                    .iter()
                    .any(|s| self.inherits_transitively(*s, element.uuid))
            {
                return Err(ModelError::Cycle {
                    relation: GraphRelation::Inheritance,
                    subject: element.uuid,
                    other: element.uuid,
                });
            }
        }

        // Category instances conform to the active schemas, and the uuid
        // space is actually unique.
        let mut uuids = Vec::new();
        for element in self.elements.values() {
            element.collect_uuids(&mut uuids);
            for category in &element.categories {
                category.conforms_to(&self.active_schemas)?;
            }
        }
        let count = uuids.len();
        uuids.sort();
        uuids.dedup();
        if uuids.len() != count {
            return Err(ModelError::Schema(
                "duplicate uuid in repository document".to_string(),
            ));
        }

        Ok(())
    }
}

/// Pre-order iterator over transitive containment descendants.
pub struct DeepChildren<'a> {
    repo: &'a Repository,
    stack: Vec<Uuid>,
}

impl<'a> Iterator for DeepChildren<'a> {
    type Item = Uuid;

    fn next(&mut self) -> Option<Uuid> {
        let uuid = self.stack.pop()?;
        if let Some(element) = self.repo.elements.get(&uuid) {
            self.stack.extend(element.children.iter().rev().copied());
        }
        Some(uuid)
    }
}
