//! User account types.
//!
//! Users are keyed by the platform-assigned numeric id (a Telegram user
//! id), not a generated one. The `current_chat_id` pointer is owned by
//! the session resolver: when set, it must reference a chat owned by
//! this user.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Role of a user account.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (role IN ('user', 'admin'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::User => write!(f, "user"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(UserRole::User),
            "admin" => Ok(UserRole::Admin),
            other => Err(format!("invalid user role: '{other}'")),
        }
    }
}

impl Default for UserRole {
    fn default() -> Self {
        UserRole::User
    }
}

/// A bot user, created on first interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Platform-assigned numeric id (unique).
    pub id: i64,
    pub name: String,
    pub role: UserRole,
    /// Pointer to the active chat, if one has been resolved.
    pub current_chat_id: Option<Uuid>,
}
