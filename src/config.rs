use chrono::Duration;
use log::{error, info};
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::{db::user::ensure_admin_exists, mongodb::ensure_indexes_exist};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    auth_ttl: u32,
    reset_ttl: u32,
    frontend_url: String,
    admin_email: String,
    mail_from: String,
    mail_endpoint: Option<String>,
    contact_inbox: Option<String>,
    // secrets
    jwt_secret: String,
    hmac_secret: String,
    admin_password: String,
    mail_api_key: Option<String>,
}

impl Config {
    /// Valid lifetime of bearer tokens in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Valid lifetime of password reset tokens in seconds.
    pub fn reset_ttl(&self) -> Duration {
        Duration::seconds(self.reset_ttl.into())
    }

    /// Base URL of the front end, used to build links in e-mails.
    pub fn frontend_url(&self) -> &str {
        self.frontend_url.trim_end_matches('/')
    }

    /// E-mail of the admin account created when no admin exists.
    pub fn admin_email(&self) -> &str {
        &self.admin_email
    }

    /// Password of the admin account created when no admin exists.
    pub fn admin_password(&self) -> &str {
        &self.admin_password
    }

    /// Sender address of outgoing mail.
    pub fn mail_from(&self) -> &str {
        &self.mail_from
    }

    /// HTTP mail relay. Mail delivery is disabled when this is absent.
    pub fn mail_endpoint(&self) -> Option<&str> {
        self.mail_endpoint.as_deref()
    }

    /// Bearer key for the mail relay.
    pub fn mail_api_key(&self) -> Option<&str> {
        self.mail_api_key.as_deref()
    }

    /// Address that receives contact-form messages.
    pub fn contact_inbox(&self) -> Option<&str> {
        self.contact_inbox.as_deref()
    }

    /// Secret key used to sign JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Secret key used to sign HMACs.
    pub fn hmac_secret(&self) -> &[u8] {
        self.hmac_secret.as_bytes()
    }
}

/// A fairing that loads the application config and puts it in managed state.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: String,
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places both a `Client` and a `Database`
/// into managed state. Must be attached after [`ConfigFairing`].
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&get_database_name());

        // Ensure the required indexes exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to create database indexes: {e}");
            return Err(rocket);
        }

        // Ensure there is at least one admin user.
        let app_config = match rocket.state::<Config>() {
            Some(config) => config,
            None => {
                error!("Application config was not available when bootstrapping the admin");
                return Err(rocket);
            }
        };
        if let Err(e) = ensure_admin_exists(&db, app_config).await {
            error!("Failed to bootstrap admin account: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
pub(crate) fn get_database_name() -> String {
    "elections".to_string()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
pub(crate) fn get_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}
