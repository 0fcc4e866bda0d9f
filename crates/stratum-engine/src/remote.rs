//! Remote model access surface.
//!
//! The HTTP/JSON layer itself is an external collaborator; this module is
//! the core-side boundary it talks to. Objects are read and written by uuid
//! as JSON values, and every write routes through the same command and
//! validation path as a local edit — remote writes cannot bypass the
//! fixed-arity or cycle invariants.

use serde_json::Value;
use uuid::Uuid;

use stratum_model::{ModelObject, PropertyValue, ScalarValue};

use crate::command::Command;
use crate::session::SharedSession;

pub struct RemoteAccess {
    session: SharedSession,
}

impl RemoteAccess {
    pub fn new(session: SharedSession) -> Self {
        Self { session }
    }

    /// Read any addressable object as JSON.
    pub fn get(&self, uuid: Uuid) -> anyhow::Result<Value> {
        let session = self.session.read();
        let object = session.get_by_uuid(uuid)?;
        let json = match object {
            ModelObject::Element(element) => serde_json::to_value(element)?,
            ModelObject::Category(category) => serde_json::to_value(category)?,
            ModelObject::Property(property) => serde_json::to_value(property)?,
        };
        Ok(json)
    }

    /// Replace the value of a scalar or reference property instance.
    ///
    /// `null` clears the slot. The payload shape is the serde form of
    /// `ScalarValue` for value slots and a uuid string for references.
    pub fn put_property(&self, uuid: Uuid, payload: Value) -> anyhow::Result<()> {
        let command = {
            let session = self.session.read();
            let object = session.get_by_uuid(uuid)?;
            let property = match object {
                ModelObject::Property(property) => property,
                _ => anyhow::bail!("{uuid} is not a property instance"),
            };
            match &property.value {
                PropertyValue::Value { .. } => {
                    let value: Option<ScalarValue> = if payload.is_null() {
                        None
                    } else {
                        Some(serde_json::from_value(payload)?)
                    };
                    Command::SetScalar {
                        property: uuid,
                        value,
                    }
                }
                PropertyValue::Reference { .. } => {
                    let target: Option<Uuid> = if payload.is_null() {
                        None
                    } else {
                        Some(serde_json::from_value(payload)?)
                    };
                    Command::SetReference {
                        property: uuid,
                        target,
                    }
                }
                other => anyhow::bail!(
                    "{uuid} is a {}; only scalar and reference slots accept replacement",
                    other.describe()
                ),
            }
        };

        self.session.write().execute(command)?;
        Ok(())
    }

    /// Flip the override flag of a property instance.
    pub fn put_override(&self, uuid: Uuid, overridden: bool) -> anyhow::Result<()> {
        self.session.write().execute(Command::SetOverride {
            property: uuid,
            overridden,
        })?;
        Ok(())
    }
}
