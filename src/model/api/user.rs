use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{api::auth::Role, db::user::User};

/// An account, without its credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDescription {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserDescription {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_string(),
            name: user.user.name,
            email: user.user.email.into(),
            role: user.user.role,
            created_at: user.user.created_at,
        }
    }
}

/// Changes to the caller's own profile. Absent fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

/// An admin changing someone's role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleUpdate {
    pub role: Role,
}
