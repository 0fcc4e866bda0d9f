//! Editing sessions.
//!
//! A session is the explicit context object owning the repository, the
//! command log and the user registry — there is no global editor registry to
//! dispatch through. All mutations go through `execute`, which validates the
//! command (including the role gate) before applying it and records the
//! outcome either way.
//!
//! The propagation pass runs on `&mut self`, so the borrow checker itself
//! serializes it against every structural edit in the session.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use stratum_model::{
    ModelObject, ModelResult, Repository, ScalarValue, SchemaId, UserRegistry,
};

use crate::command::{
    check_access, Command, CommandReceipt, CommandRecord, CommandStatus, PreparedCommand,
};
use crate::inheritance::{self, InheritanceReport, PassOptions};

pub struct EditingSession {
    repository: Repository,
    roles: UserRegistry,
    active_user: String,
    log: Vec<CommandRecord>,
}

impl EditingSession {
    pub fn new(repository: Repository) -> Self {
        Self {
            repository,
            roles: UserRegistry::new(),
            active_user: "local".to_string(),
            log: Vec::new(),
        }
    }

    pub fn with_roles(repository: Repository, roles: UserRegistry) -> Self {
        Self {
            roles,
            ..Self::new(repository)
        }
    }

    pub fn set_active_user(&mut self, user: impl Into<String>) {
        self.active_user = user.into();
    }

    pub fn active_user(&self) -> &str {
        &self.active_user
    }

    pub fn roles(&self) -> &UserRegistry {
        &self.roles
    }

    pub fn roles_mut(&mut self) -> &mut UserRegistry {
        &mut self.roles
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Hand the repository back, consuming the session.
    pub fn into_repository(self) -> Repository {
        self.repository
    }

    pub fn log(&self) -> &[CommandRecord] {
        &self.log
    }

    pub fn get_by_uuid(&self, uuid: Uuid) -> ModelResult<ModelObject<'_>> {
        self.repository.get_by_uuid(uuid)
    }

    // ========================================================================
    // Command execution
    // ========================================================================

    /// Check a command against the current state without executing it.
    pub fn prepare(&self, command: Command) -> PreparedCommand {
        let verdict = check_access(&command, &self.repository, &self.roles, &self.active_user)
            .and_then(|()| command.validate(&self.repository));
        match verdict {
            Ok(()) => PreparedCommand::Executable(command),
            Err(err) => PreparedCommand::Unexecutable {
                command,
                reason: err.to_string(),
            },
        }
    }

    /// Validate and apply one command atomically. The outcome — applied or
    /// rejected — is appended to the command log; a rejected command leaves
    /// the repository untouched.
    pub fn execute(&mut self, command: Command) -> ModelResult<CommandReceipt> {
        let record = Uuid::new_v4();
        let result = check_access(&command, &self.repository, &self.roles, &self.active_user)
            .and_then(|()| command.validate(&self.repository))
            .and_then(|()| command.apply(&mut self.repository));

        let status = match &result {
            Ok(_) => CommandStatus::Applied,
            Err(err) => CommandStatus::Rejected {
                reason: err.to_string(),
            },
        };
        self.log.push(CommandRecord {
            id: record,
            timestamp: Utc::now(),
            user: self.active_user.clone(),
            command,
            status,
        });

        result.map(|created| CommandReceipt { record, created })
    }

    /// Execute a command that was prepared earlier. An unexecutable command
    /// stays a no-op: the full validation path runs again, records the
    /// rejection in the log and leaves the repository untouched.
    pub fn execute_prepared(&mut self, prepared: PreparedCommand) -> ModelResult<CommandReceipt> {
        self.execute(prepared.into_command())
    }

    // ========================================================================
    // Convenience wrappers
    // ========================================================================

    pub fn create_element(&mut self, name: impl Into<String>) -> ModelResult<Uuid> {
        let uuid = Uuid::new_v4();
        self.execute(Command::CreateElement {
            uuid,
            name: name.into(),
        })?;
        Ok(uuid)
    }

    pub fn add_root(&mut self, element: Uuid) -> ModelResult<()> {
        self.execute(Command::AddRoot { element }).map(|_| ())
    }

    pub fn add_child(&mut self, parent: Uuid, child: Uuid) -> ModelResult<()> {
        self.execute(Command::AddChild { parent, child }).map(|_| ())
    }

    pub fn add_inheritance_edge(&mut self, subject: Uuid, source: Uuid) -> ModelResult<()> {
        self.execute(Command::AddInheritanceEdge { subject, source })
            .map(|_| ())
    }

    pub fn attach_category(&mut self, element: Uuid, schema: &SchemaId) -> ModelResult<Uuid> {
        let receipt = self.execute(Command::AttachCategory {
            element,
            schema: schema.clone(),
        })?;
        receipt
            .created
            .ok_or_else(|| stratum_model::ModelError::NotFound(element))
    }

    pub fn set_scalar(&mut self, property: Uuid, value: Option<ScalarValue>) -> ModelResult<()> {
        self.execute(Command::SetScalar { property, value })
            .map(|_| ())
    }

    pub fn set_override(&mut self, property: Uuid, overridden: bool) -> ModelResult<()> {
        self.execute(Command::SetOverride {
            property,
            overridden,
        })
        .map(|_| ())
    }

    // ========================================================================
    // Propagation
    // ========================================================================

    /// Run one explicit inheritance pass over the whole repository.
    pub fn perform_inheritance(&mut self) -> ModelResult<InheritanceReport> {
        inheritance::perform_inheritance(&mut self.repository)
    }

    pub fn perform_inheritance_with(
        &mut self,
        options: &PassOptions,
    ) -> ModelResult<InheritanceReport> {
        inheritance::perform_inheritance_with(&mut self.repository, options)
    }
}

/// Shared handle for the remote-access surface. A propagation pass or any
/// edit takes the write lock, serializing it against all other access.
pub type SharedSession = Arc<RwLock<EditingSession>>;

pub fn shared(session: EditingSession) -> SharedSession {
    Arc::new(RwLock::new(session))
}
