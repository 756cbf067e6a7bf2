//! Caller identity as handed to us by the external auth collaborator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Owner,
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Owner => write!(f, "owner"),
            Role::Client => write!(f, "client"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "owner" => Ok(Role::Owner),
            "client" => Ok(Role::Client),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleContext {
    pub user_id: Option<String>,
    pub authenticated: bool,
    pub roles: Vec<Role>,
}

impl RoleContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: &str, roles: &[Role]) -> Self {
        let mut roles = roles.to_vec();
        roles.sort();
        roles.dedup();
        Self {
            user_id: Some(user_id.to_string()),
            authenticated: true,
            roles,
        }
    }

    pub fn has(&self, role: Role) -> bool {
        self.authenticated && self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has(Role::Admin)
    }

    pub fn is_owner(&self) -> bool {
        self.has(Role::Owner)
    }

    pub fn is_client(&self) -> bool {
        self.has(Role::Client)
    }

    /// Highest-privilege role held, for display.
    pub fn primary_role(&self) -> Option<Role> {
        self.roles.iter().copied().min()
    }
}

/// Keep the first and last four characters; short ids are masked entirely.
pub fn mask_user_id(user_id: &str) -> String {
    let chars: Vec<char> = user_id.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len().max(4));
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}****{}", head, tail)
}
