//! Role based table permissions

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use tabula_core::{Result, TabulaError};

/// Table names listed under this key apply to every table
pub const ALL_TABLES: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Create,
    Update,
    Delete,
    Import,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::Read,
        Capability::Create,
        Capability::Update,
        Capability::Delete,
        Capability::Import,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Read => "read",
            Capability::Create => "create",
            Capability::Update => "update",
            Capability::Delete => "delete",
            Capability::Import => "import",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = TabulaError;

    fn from_str(s: &str) -> Result<Self> {
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TabulaError::Validation(format!("Unknown capability '{}'", s)))
    }
}

/// The acting user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl User {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Permission lookups consulted before list and mutation operations
pub trait GrantsProvider: Send + Sync {
    fn can(&self, capability: Capability, table: &str, user: &User) -> bool;

    /// Administrators bypass every check and may run DDL
    fn is_admin(&self, user: &User) -> bool;
}

/// Role -> capability -> table list store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grants {
    #[serde(default = "default_admin_role")]
    admin_role: String,
    #[serde(default)]
    roles: BTreeMap<String, BTreeMap<Capability, BTreeSet<String>>>,
}

fn default_admin_role() -> String {
    "administrator".to_string()
}

impl Default for Grants {
    fn default() -> Self {
        Self::new(default_admin_role())
    }
}

impl Grants {
    pub fn new(admin_role: impl Into<String>) -> Self {
        Self {
            admin_role: admin_role.into(),
            roles: BTreeMap::new(),
        }
    }

    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn admin_role(&self) -> &str {
        &self.admin_role
    }

    /// Allow `role` to exercise `capability` on `table` (`*` for all tables)
    pub fn grant(&mut self, role: &str, capability: Capability, table: &str) -> &mut Self {
        self.roles
            .entry(role.to_string())
            .or_default()
            .entry(capability)
            .or_default()
            .insert(table.to_string());
        self
    }

    pub fn revoke(&mut self, role: &str, capability: Capability, table: &str) -> &mut Self {
        if let Some(tables) = self
            .roles
            .get_mut(role)
            .and_then(|caps| caps.get_mut(&capability))
        {
            tables.remove(table);
        }
        self
    }

    /// Tables `role` may exercise `capability` on
    pub fn tables_for(&self, role: &str, capability: Capability) -> Vec<String> {
        self.roles
            .get(role)
            .and_then(|caps| caps.get(&capability))
            .map(|tables| tables.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn role_can(&self, role: &str, capability: Capability, table: &str) -> bool {
        self.roles
            .get(role)
            .and_then(|caps| caps.get(&capability))
            .is_some_and(|tables| tables.contains(table) || tables.contains(ALL_TABLES))
    }
}

impl GrantsProvider for Grants {
    fn can(&self, capability: Capability, table: &str, user: &User) -> bool {
        self.is_admin(user)
            || user
                .roles
                .iter()
                .any(|role| self.role_can(role, capability, table))
    }

    fn is_admin(&self, user: &User) -> bool {
        user.has_role(&self.admin_role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_role_grants() {
        let mut grants = Grants::default();
        grants
            .grant("editor", Capability::Read, "items")
            .grant("editor", Capability::Update, "items")
            .grant("viewer", Capability::Read, ALL_TABLES);

        let editor = User::new(2, "ed").with_role("editor");
        let viewer = User::new(3, "vi").with_role("viewer");

        assert!(grants.can(Capability::Update, "items", &editor));
        assert!(!grants.can(Capability::Delete, "items", &editor));
        assert!(!grants.can(Capability::Read, "types", &editor));
        assert!(grants.can(Capability::Read, "anything", &viewer));
        assert!(!grants.can(Capability::Create, "anything", &viewer));

        grants.revoke("editor", Capability::Update, "items");
        assert!(!grants.can(Capability::Update, "items", &editor));
    }

    #[test]
    fn test_admin_bypasses_checks() {
        let grants = Grants::new("owner");
        let owner = User::new(1, "root").with_role("owner");
        assert!(grants.is_admin(&owner));
        for capability in Capability::ALL {
            assert!(grants.can(capability, "secret", &owner));
        }
        assert!(!grants.can(Capability::Read, "secret", &User::new(9, "anon")));
    }

    #[test]
    fn test_json_roundtrip() {
        let mut grants = Grants::default();
        grants.grant("editor", Capability::Import, "items");
        let json = grants.to_json().unwrap();
        assert!(json.contains("\"import\""));
        assert_eq!(Grants::from_json(&json).unwrap(), grants);
        assert_eq!(grants.tables_for("editor", Capability::Import), vec!["items"]);
    }

    #[test]
    fn test_capability_parse() {
        assert_eq!("DELETE".parse::<Capability>().unwrap(), Capability::Delete);
        assert!("drop".parse::<Capability>().unwrap_err().is_validation());
    }
}
