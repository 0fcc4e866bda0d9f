//! Disciplines and the user registry.
//!
//! An element may be assigned to a discipline; editing commands on such an
//! element are only accepted for users belonging to that discipline. The
//! super-user switch bypasses the check, which is what bulk tooling uses.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discipline {
    pub name: String,
    pub users: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegistry {
    pub super_user: bool,
    disciplines: BTreeMap<String, Discipline>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_discipline(&mut self, discipline: Discipline) {
        self.disciplines.insert(discipline.name.clone(), discipline);
    }

    pub fn discipline(&self, name: &str) -> Option<&Discipline> {
        self.disciplines.get(name)
    }

    /// Whether `user` may modify an element assigned to `discipline`.
    /// Elements without an assignment are open to everyone; an assignment
    /// naming an unregistered discipline locks the element down to the
    /// super user.
    pub fn can_modify(&self, user: &str, discipline: Option<&str>) -> bool {
        if self.super_user {
            return true;
        }
        match discipline {
            None => true,
            Some(name) => self
                .disciplines
                .get(name)
                .is_some_and(|d| d.users.iter().any(|u| u == user)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_gates_assigned_elements() {
        let mut registry = UserRegistry::new();
        registry.register_discipline(Discipline {
            name: "power".to_string(),
            users: vec!["ada".to_string()],
        });

        assert!(registry.can_modify("ada", Some("power")));
        assert!(!registry.can_modify("bob", Some("power")));
        assert!(registry.can_modify("bob", None));
        assert!(!registry.can_modify("bob", Some("unregistered")));

        registry.super_user = true;
        assert!(registry.can_modify("bob", Some("power")));
    }
}
