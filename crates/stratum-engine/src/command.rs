//! Validated edit commands.
//!
//! A single logical change is a `Command` value: validated against the
//! current repository state, then applied atomically or rejected as a whole.
//! Rejected commands never leave partial state behind — every variant maps
//! onto one repository operation that checks its invariants before mutating.
//!
//! Commands are plain serializable data, so the session's command log can be
//! persisted and inspected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stratum_model::{
    CategoryInstantiator, ModelError, ModelResult, PropertyValue, Repository, ScalarValue,
    SchemaId, UserRegistry,
};

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    /// Create a fresh unattached element. The uuid is chosen by the caller
    /// so the log entry identifies what was created.
    CreateElement { uuid: Uuid, name: String },
    AddRoot { element: Uuid },
    AddChild { parent: Uuid, child: Uuid },
    DetachChild { parent: Uuid, child: Uuid },
    RemoveElement { element: Uuid },
    AddInheritanceEdge { subject: Uuid, source: Uuid },
    RemoveInheritanceEdge { subject: Uuid, source: Uuid },
    AttachCategory { element: Uuid, schema: SchemaId },
    RemoveCategory { element: Uuid, category: Uuid },
    SetScalar {
        property: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<ScalarValue>,
    },
    SetReference {
        property: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<Uuid>,
    },
    SetOverride { property: Uuid, overridden: bool },
    SetDiscipline {
        element: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        discipline: Option<String>,
    },
    /// Insert a freshly instantiated item into a dynamic array.
    ArrayInsert { array: Uuid, index: usize },
    ArrayRemove { array: Uuid, index: usize },
    ArrayClear { array: Uuid },
}

impl Command {
    /// Elements whose state this command touches, for the role check.
    pub(crate) fn involved_elements(&self, repo: &Repository) -> Vec<Uuid> {
        let owner = |uuid: Uuid| repo.find_owner(uuid).map(|e| e.uuid);
        match self {
            Command::CreateElement { .. } => Vec::new(),
            Command::AddRoot { element }
            | Command::RemoveElement { element }
            | Command::AttachCategory { element, .. }
            | Command::RemoveCategory { element, .. }
            | Command::SetDiscipline { element, .. } => vec![*element],
            Command::AddChild { parent, child } | Command::DetachChild { parent, child } => {
                vec![*parent, *child]
            }
            Command::AddInheritanceEdge { subject, .. }
            | Command::RemoveInheritanceEdge { subject, .. } => vec![*subject],
            Command::SetScalar { property, .. }
            | Command::SetReference { property, .. }
            | Command::SetOverride { property, .. }
            | Command::ArrayInsert { array: property, .. }
            | Command::ArrayRemove { array: property, .. }
            | Command::ArrayClear { array: property } => {
                owner(*property).into_iter().collect()
            }
        }
    }

    /// Validate without mutating. Everything checked here is re-checked by
    /// `apply`, so a stale verdict can never corrupt state.
    pub(crate) fn validate(&self, repo: &Repository) -> ModelResult<()> {
        match self {
            Command::CreateElement { .. } => Ok(()),
            Command::AddRoot { element } => {
                let el = repo.element(*element)?;
                if el.parent.is_some() {
                    return Err(ModelError::AlreadyParented { child: *element });
                }
                Ok(())
            }
            Command::AddChild { parent, child } => {
                repo.element(*parent)?;
                let child_el = repo.element(*child)?;
                match child_el.parent {
                    Some(existing) if existing != *parent => {
                        Err(ModelError::AlreadyParented { child: *child })
                    }
                    _ => {
                        if *parent == *child || repo.is_ancestor(*child, *parent) {
                            Err(ModelError::Cycle {
                                relation: stratum_model::GraphRelation::Containment,
                                subject: *parent,
                                other: *child,
                            })
                        } else {
                            Ok(())
                        }
                    }
                }
            }
            Command::DetachChild { parent, child } => {
                repo.element(*parent)?;
                let child_el = repo.element(*child)?;
                if child_el.parent != Some(*parent) {
                    return Err(ModelError::NotFound(*child));
                }
                Ok(())
            }
            Command::RemoveElement { element } => repo.element(*element).map(|_| ()),
            Command::AddInheritanceEdge { subject, source } => {
                let subject_el = repo.element(*subject)?;
                repo.element(*source)?;
                if subject_el.supers.contains(source) {
                    return Err(ModelError::DuplicateEdge {
                        subject: *subject,
                        source_id: *source,
                    });
                }
                if subject == source || repo.inherits_transitively(*source, *subject) {
                    return Err(ModelError::Cycle {
                        relation: stratum_model::GraphRelation::Inheritance,
                        subject: *subject,
                        other: *source,
                    });
                }
                Ok(())
            }
            Command::RemoveInheritanceEdge { subject, source } => {
                let subject_el = repo.element(*subject)?;
                if !subject_el.supers.contains(source) {
                    return Err(ModelError::NotFound(*source));
                }
                Ok(())
            }
            Command::AttachCategory { element, schema } => {
                repo.element(*element)?;
                if !repo.active_schemas.contains(schema) {
                    return Err(ModelError::UnknownSchema(schema.clone()));
                }
                Ok(())
            }
            Command::RemoveCategory { element, category } => {
                let el = repo.element(*element)?;
                if !el.categories.iter().any(|c| c.uuid == *category) {
                    return Err(ModelError::NotFound(*category));
                }
                Ok(())
            }
            Command::SetScalar { property, value } => {
                let instance = repo.find_property(*property)?;
                match &instance.value {
                    PropertyValue::Value { kind, .. } => {
                        if let Some(v) = value {
                            if v.kind() != *kind {
                                return Err(ModelError::TypeMismatch {
                                    expected: kind.to_string(),
                                    actual: v.kind().to_string(),
                                });
                            }
                        }
                        Ok(())
                    }
                    other => Err(ModelError::TypeMismatch {
                        expected: "scalar value slot".to_string(),
                        actual: other.describe(),
                    }),
                }
            }
            Command::SetReference { property, target } => {
                let instance = repo.find_property(*property)?;
                match &instance.value {
                    PropertyValue::Reference { .. } => {
                        if let Some(target) = target {
                            // The target must resolve now; dangling targets
                            // are only tolerated as an *aftermath* of
                            // removal, never written deliberately.
                            repo.get_by_uuid(*target)?;
                        }
                        Ok(())
                    }
                    other => Err(ModelError::TypeMismatch {
                        expected: "reference slot".to_string(),
                        actual: other.describe(),
                    }),
                }
            }
            Command::SetOverride { property, .. } => repo.find_property(*property).map(|_| ()),
            Command::SetDiscipline { element, .. } => repo.element(*element).map(|_| ()),
            Command::ArrayInsert { array, index } => {
                let (arity, len) = array_shape(repo, *array)?;
                if let stratum_model::Arity::Fixed { size } = arity {
                    return Err(ModelError::UnsupportedStructuralChange { size });
                }
                if *index > len {
                    return Err(ModelError::IndexOutOfBounds { index: *index, len });
                }
                Ok(())
            }
            Command::ArrayRemove { array, index } => {
                let (arity, len) = array_shape(repo, *array)?;
                if let stratum_model::Arity::Fixed { size } = arity {
                    return Err(ModelError::UnsupportedStructuralChange { size });
                }
                if *index >= len {
                    return Err(ModelError::IndexOutOfBounds { index: *index, len });
                }
                Ok(())
            }
            Command::ArrayClear { array } => {
                let (arity, _) = array_shape(repo, *array)?;
                if let stratum_model::Arity::Fixed { size } = arity {
                    return Err(ModelError::UnsupportedStructuralChange { size });
                }
                Ok(())
            }
        }
    }

    /// Apply the command. Each arm delegates to one atomic repository
    /// operation; on error the repository is unchanged.
    pub(crate) fn apply(&self, repo: &mut Repository) -> ModelResult<Option<Uuid>> {
        match self {
            Command::CreateElement { uuid, name } => {
                let mut element = stratum_model::Element::new(name.clone());
                element.uuid = *uuid;
                let created = element.uuid;
                repo.insert_element(element)?;
                Ok(Some(created))
            }
            Command::AddRoot { element } => repo.add_root(*element).map(|()| None),
            Command::AddChild { parent, child } => repo.add_child(*parent, *child).map(|()| None),
            Command::DetachChild { parent, child } => {
                repo.detach_child(*parent, *child).map(|()| None)
            }
            Command::RemoveElement { element } => repo.remove_element(*element).map(|_| None),
            Command::AddInheritanceEdge { subject, source } => {
                repo.add_inheritance_edge(*subject, *source).map(|()| None)
            }
            Command::RemoveInheritanceEdge { subject, source } => repo
                .remove_inheritance_edge(*subject, *source)
                .map(|()| None),
            Command::AttachCategory { element, schema } => {
                repo.attach_category(*element, schema).map(Some)
            }
            Command::RemoveCategory { element, category } => {
                repo.remove_category(*element, *category).map(|()| None)
            }
            Command::SetScalar { property, value } => {
                let instance = repo.find_property_mut(*property)?;
                instance.set_scalar(value.clone()).map(|()| None)
            }
            Command::SetReference { property, target } => {
                if let Some(target) = target {
                    repo.get_by_uuid(*target)?;
                }
                let instance = repo.find_property_mut(*property)?;
                instance.set_reference(*target).map(|()| None)
            }
            Command::SetOverride {
                property,
                overridden,
            } => {
                let instance = repo.find_property_mut(*property)?;
                instance.overridden = *overridden;
                Ok(None)
            }
            Command::SetDiscipline {
                element,
                discipline,
            } => {
                repo.element_mut(*element)?.discipline = discipline.clone();
                Ok(None)
            }
            Command::ArrayInsert { array, index } => {
                let (name, item_kind) = {
                    let instance = repo.find_property(*array)?;
                    match &instance.value {
                        PropertyValue::Array { array } => {
                            (instance.name.clone(), array.item_kind().clone())
                        }
                        other => {
                            return Err(ModelError::TypeMismatch {
                                expected: "array".to_string(),
                                actual: other.describe(),
                            })
                        }
                    }
                };
                let fresh = CategoryInstantiator::new(&repo.active_schemas)
                    .instantiate_item(&name, &item_kind)?;
                let created = fresh.uuid;
                let instance = repo.find_property_mut(*array)?;
                match &mut instance.value {
                    PropertyValue::Array { array } => {
                        array.insert(*index, fresh)?;
                        Ok(Some(created))
                    }
                    other => Err(ModelError::TypeMismatch {
                        expected: "array".to_string(),
                        actual: other.describe(),
                    }),
                }
            }
            Command::ArrayRemove { array, index } => {
                let instance = repo.find_property_mut(*array)?;
                match &mut instance.value {
                    PropertyValue::Array { array } => array.remove_at(*index).map(|_| None),
                    other => Err(ModelError::TypeMismatch {
                        expected: "array".to_string(),
                        actual: other.describe(),
                    }),
                }
            }
            Command::ArrayClear { array } => {
                let instance = repo.find_property_mut(*array)?;
                match &mut instance.value {
                    PropertyValue::Array { array } => array.clear().map(|()| None),
                    other => Err(ModelError::TypeMismatch {
                        expected: "array".to_string(),
                        actual: other.describe(),
                    }),
                }
            }
        }
    }
}

fn array_shape(repo: &Repository, uuid: Uuid) -> ModelResult<(stratum_model::Arity, usize)> {
    let instance = repo.find_property(uuid)?;
    match &instance.value {
        PropertyValue::Array { array } => Ok((array.arity(), array.len())),
        other => Err(ModelError::TypeMismatch {
            expected: "array".to_string(),
            actual: other.describe(),
        }),
    }
}

/// Role gate shared by validation and execution.
pub(crate) fn check_access(
    command: &Command,
    repo: &Repository,
    roles: &UserRegistry,
    user: &str,
) -> ModelResult<()> {
    for uuid in command.involved_elements(repo) {
        if let Ok(element) = repo.element(uuid) {
            if !roles.can_modify(user, element.discipline.as_deref()) {
                return Err(ModelError::AccessDenied {
                    user: user.to_string(),
                    discipline: element.discipline.clone().unwrap_or_default(),
                });
            }
        }
    }
    Ok(())
}

// ============================================================================
// Log records and prepared commands
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandStatus {
    Applied,
    Rejected { reason: String },
}

/// One entry of the session's command log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub command: Command,
    pub status: CommandStatus,
}

/// Outcome of a successfully applied command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandReceipt {
    pub record: Uuid,
    /// Uuid of the object the command created, if it created one.
    pub created: Option<Uuid>,
}

/// A command checked against the current state without being executed.
///
/// Structurally forbidden mutations come back as `Unexecutable` values
/// instead of errors, so callers can probe validity first and only execute
/// what can actually run.
#[derive(Debug, Clone, PartialEq)]
pub enum PreparedCommand {
    Executable(Command),
    Unexecutable { command: Command, reason: String },
}

impl PreparedCommand {
    pub fn can_execute(&self) -> bool {
        matches!(self, PreparedCommand::Executable(_))
    }

    pub fn command(&self) -> &Command {
        match self {
            PreparedCommand::Executable(command) => command,
            PreparedCommand::Unexecutable { command, .. } => command,
        }
    }

    pub fn into_command(self) -> Command {
        match self {
            PreparedCommand::Executable(command) => command,
            PreparedCommand::Unexecutable { command, .. } => command,
        }
    }
}
