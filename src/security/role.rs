//! Role Hierarchy Module
//!
//! Roles form a total order: `User < Premium < Admin`. A higher role carries
//! every capability of the roles below it, so permission checks reduce to an
//! ordinal comparison.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Role enumeration for access control
///
/// Variant order defines the hierarchy; the derived `Ord` is what
/// [`has_permission`] compares.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular signed-in or anonymous user
    #[default]
    User,
    /// Paying user
    Premium,
    /// Full administrator
    Admin,
}

impl Role {
    /// All roles, lowest privilege first
    pub const ALL: [Role; 3] = [Role::User, Role::Premium, Role::Admin];

    /// Position in the hierarchy
    pub fn ordinal(self) -> u8 {
        match self {
            Role::User => 0,
            Role::Premium => 1,
            Role::Admin => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Premium => "premium",
            Role::Admin => "admin",
        }
    }

    /// Check if role has admin privileges
    pub fn is_admin(self) -> bool {
        is_admin_user(self)
    }

    /// Check if role has premium access (admins always do)
    pub fn is_premium(self) -> bool {
        is_premium_user(self)
    }

    /// Check whether this role satisfies `required`
    pub fn satisfies(self, required: Role) -> bool {
        has_permission(self, required)
    }

    pub fn flags(self) -> RoleFlags {
        RoleFlags::from(self)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "premium" => Ok(Role::Premium),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::Validation(format!("unknown role '{}'", other))),
        }
    }
}

/// Check if a user's role meets or exceeds the required role.
pub fn has_permission(user_role: Role, required_role: Role) -> bool {
    user_role.ordinal() >= required_role.ordinal()
}

/// Check if user can access admin features
pub fn is_admin_user(role: Role) -> bool {
    has_permission(role, Role::Admin)
}

/// Check if user has premium access
pub fn is_premium_user(role: Role) -> bool {
    has_permission(role, Role::Premium)
}

/// Flags derived from a role, never stored independently of it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoleFlags {
    pub is_admin: bool,
    pub is_premium: bool,
}

impl From<Role> for RoleFlags {
    fn from(role: Role) -> Self {
        Self {
            is_admin: is_admin_user(role),
            is_premium: is_premium_user(role),
        }
    }
}
