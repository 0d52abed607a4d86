use serde::{Deserialize, Serialize};

use crate::model::api::user::UserDescription;

/// Account credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// A request to open an organizer account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Voter credentials for a single election.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoterLoginRequest {
    pub election_id: String,
    pub email: String,
    pub access_key: String,
}

/// A successful account login or registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserDescription,
}

/// A successful voter login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoterAuthResponse {
    pub token: String,
    pub election_id: String,
    pub voter_id: String,
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl LoginRequest {
        pub fn example_admin() -> Self {
            Self {
                email: "alice@example.com".to_string(),
                password: "alice's password".to_string(),
            }
        }

        pub fn example_organizer() -> Self {
            Self {
                email: "oscar@example.com".to_string(),
                password: "oscar's password".to_string(),
            }
        }

        pub fn example_organizer2() -> Self {
            Self {
                email: "olive@example.com".to_string(),
                password: "olive's password".to_string(),
            }
        }
    }

    impl RegisterRequest {
        pub fn example() -> Self {
            Self {
                name: "Rita Registrant".to_string(),
                email: "Rita@Example.com".to_string(),
                password: "rita's password".to_string(),
            }
        }
    }
}
