//! Stratum editing and inheritance engine.
//!
//! Sits on top of `stratum-model` and adds the mutable half of the system:
//!
//! - `command` / `session`: transactional edits. A change is a `Command`
//!   value, validated against the current state and applied atomically or
//!   rejected as a whole, with every outcome recorded in the session log.
//! - `inheritance`: the explicit, batched propagation pass that recomputes
//!   non-overridden property values along inheritance edges in depth order.
//! - `remote`: the uuid-addressed read/write surface the external HTTP
//!   layer mounts on; writes route through the same command path as local
//!   edits.

pub mod command;
pub mod inheritance;
pub mod remote;
pub mod session;


pub use command::{Command, CommandReceipt, CommandRecord, CommandStatus, PreparedCommand};
pub use inheritance::{
    perform_inheritance, perform_inheritance_with, InheritanceReport, PassOptions,
    SchemaMismatchNote,
};
pub use remote::RemoteAccess;
pub use session::{shared, EditingSession, SharedSession};
