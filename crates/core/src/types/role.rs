//! Account roles as reported by the commerce API.

use serde::{Deserialize, Serialize};

/// Role attached to an authenticated identity.
///
/// Only `"admin"` carries meaning on the client: every other value the
/// backend sends is preserved verbatim but treated uniformly as non-admin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    /// Store administrator. May browse during maintenance.
    Admin,
    /// Any other role string (customer, staff, ...).
    Other(String),
}

impl Role {
    /// Wire value of the admin role.
    pub const ADMIN: &'static str = "admin";

    /// Returns true if this role grants admin access.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Returns the wire representation of the role.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Admin => Self::ADMIN,
            Self::Other(role) => role,
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::Other("customer".to_string())
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        if value == Self::ADMIN {
            Self::Admin
        } else {
            Self::Other(value)
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Admin => Role::ADMIN.to_string(),
            Role::Other(role) => role,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}
