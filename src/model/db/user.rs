use std::ops::{Deref, DerefMut};

use argon2::Config as Argon2Config;
use chrono::{DateTime, Utc};
use log::{info, warn};
use mongodb::{
    bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime},
    Database,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    model::{api::auth::Role, common::email::Email, mongodb::{Coll, Id}},
    Config,
};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash a plaintext password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    // 16 bytes is recommended for password hashing:
    //  https://en.wikipedia.org/wiki/Argon2
    let mut salt = [0_u8; 16];
    rand::thread_rng().fill(&mut salt);
    Ok(argon2::hash_encoded(
        password.as_bytes(),
        &salt,
        &Argon2Config::default(),
    )?)
}

/// Core account data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCore {
    pub name: String,
    pub email: Email,
    pub password_hash: String,
    pub role: Role,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl UserCore {
    /// Create a new account, hashing the password.
    pub fn new(name: String, email: Email, password: &str, role: Role) -> Result<Self> {
        Ok(Self {
            name,
            email,
            password_hash: hash_password(password)?,
            role,
            created_at: Utc::now(),
        })
    }

    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        argon2::verify_encoded(&self.password_hash, password.as_ref()).unwrap_or(false)
    }
}

/// An account without an ID.
pub type NewUser = UserCore;

/// An account from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub user: UserCore,
}

impl Deref for User {
    type Target = UserCore;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl DerefMut for User {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.user
    }
}

/// Ensure at least one admin account exists, creating (or promoting) the
/// configured bootstrap admin if necessary.
///
/// This operation is idempotent.
pub async fn ensure_admin_exists(db: &Database, config: &Config) -> Result<()> {
    let users = Coll::<User>::from_db(db);
    let admins = users
        .count_documents(doc! { "role": Role::Admin }, None)
        .await?;
    if admins > 0 {
        return Ok(());
    }

    let email: Email = config.admin_email().parse().map_err(|_| {
        crate::error::Error::internal(format!(
            "Configured admin e-mail '{}' is invalid",
            config.admin_email()
        ))
    })?;
    let existing = users.find_one(doc! { "email": &email }, None).await?;
    match existing {
        Some(user) => {
            warn!("No admin account exists, promoting {email} to admin");
            users
                .update_one(
                    user.id.as_doc(),
                    doc! { "$set": { "role": Role::Admin } },
                    None,
                )
                .await?;
        }
        None => {
            warn!("No admin account exists, creating {email}");
            let admin = NewUser::new(
                "Administrator".to_string(),
                email,
                config.admin_password(),
                Role::Admin,
            )?;
            Coll::<NewUser>::from_db(db).insert_one(admin, None).await?;
        }
    }
    info!("Admin account bootstrapped");
    Ok(())
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    use crate::model::api::auth::LoginRequest;

    impl UserCore {
        pub fn example_admin() -> Self {
            let credentials = LoginRequest::example_admin();
            Self::new(
                "Alice Admin".to_string(),
                credentials.email.parse().unwrap(),
                &credentials.password,
                Role::Admin,
            )
            .unwrap()
        }

        pub fn example_organizer() -> Self {
            let credentials = LoginRequest::example_organizer();
            Self::new(
                "Oscar Organizer".to_string(),
                credentials.email.parse().unwrap(),
                &credentials.password,
                Role::Organizer,
            )
            .unwrap()
        }

        pub fn example_organizer2() -> Self {
            let credentials = LoginRequest::example_organizer2();
            Self::new(
                "Olive Organizer".to_string(),
                credentials.email.parse().unwrap(),
                &credentials.password,
                Role::Organizer,
            )
            .unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_verification() {
        let user = NewUser::new(
            "Test".to_string(),
            "test@example.com".parse().unwrap(),
            "a long password",
            Role::Organizer,
        )
        .unwrap();
        assert!(user.verify_password("a long password"));
        assert!(!user.verify_password("a wrong password"));
        assert_ne!(user.password_hash, "a long password");
    }

    #[test]
    fn hashes_are_salted() {
        assert_ne!(
            hash_password("same password").unwrap(),
            hash_password("same password").unwrap()
        );
    }

    #[test]
    fn malformed_hash_never_verifies() {
        let mut user = NewUser::example_organizer();
        user.password_hash = "not a hash".to_string();
        assert!(!user.verify_password("anything"));
    }

    #[backend_test]
    async fn bootstraps_admin_once(db: Database) {
        let config = Config::example();
        ensure_admin_exists(&db, &config).await.unwrap();
        ensure_admin_exists(&db, &config).await.unwrap();

        let users = Coll::<User>::from_db(&db);
        assert_eq!(users.count_documents(None, None).await.unwrap(), 1);
        let admin = users.find_one(None, None).await.unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(&*admin.email, config.admin_email());
        assert!(admin.verify_password(config.admin_password()));
    }

    #[backend_test]
    async fn bootstrap_promotes_existing_account(db: Database, new_users: Coll<NewUser>) {
        let config = Config::example();
        let mut existing = NewUser::example_organizer();
        existing.email = config.admin_email().parse().unwrap();
        new_users.insert_one(&existing, None).await.unwrap();

        ensure_admin_exists(&db, &config).await.unwrap();

        let users = Coll::<User>::from_db(&db);
        assert_eq!(users.count_documents(None, None).await.unwrap(), 1);
        let admin = users.find_one(None, None).await.unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.name, existing.name);
    }
}
