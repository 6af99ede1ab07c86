use serde::{Deserialize, Serialize};
use std::fmt;

/// Membership role an account can hold in a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Contributor,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Owner, Role::Contributor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Contributor => "contributor",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "owner" => Some(Role::Owner),
            "contributor" => Some(Role::Contributor),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Roles derived for one account. Never stored; recomputed from set
/// membership on every check. Both flags may be set at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet {
    pub owner: bool,
    pub contributor: bool,
}

impl RoleSet {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with(mut self, role: Role) -> Self {
        match role {
            Role::Owner => self.owner = true,
            Role::Contributor => self.contributor = true,
        }
        self
    }

    pub fn contains(&self, role: Role) -> bool {
        match role {
            Role::Owner => self.owner,
            Role::Contributor => self.contributor,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.owner && !self.contributor
    }

    pub fn roles(&self) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|role| self.contains(*role))
            .collect()
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<_> = self.roles().iter().map(Role::as_str).collect();
        f.write_str(&names.join("+"))
    }
}
