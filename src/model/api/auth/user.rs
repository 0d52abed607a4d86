use std::fmt::Display;

use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};

use crate::model::db::{election::Voter, user::User as Account};

/// A kind of principal that an [`super::AuthToken`] can stand for.
pub trait User {
    /// Can a principal with the given role act as this kind of user?
    fn permits(role: Role) -> bool;
}

/// Different privilege levels.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Organizer,
    Voter,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Organizer => "organizer",
            Self::Voter => "voter",
        }
    }
}

impl Display for Role {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl From<Role> for Bson {
    fn from(role: Role) -> Self {
        Bson::String(role.as_str().to_string())
    }
}

/// Any account holder: an admin or an organizer.
impl User for Account {
    fn permits(role: Role) -> bool {
        matches!(role, Role::Admin | Role::Organizer)
    }
}

/// Marker for admin-only endpoints.
pub struct Admin;

impl User for Admin {
    fn permits(role: Role) -> bool {
        role == Role::Admin
    }
}

impl User for Voter {
    fn permits(role: Role) -> bool {
        role == Role::Voter
    }
}
