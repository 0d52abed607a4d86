#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod mail;
pub mod model;
pub mod scheduled_task;

pub use config::Config;
pub use events::ElectionEvents;
pub use model::db::election::StatusScheduler;

use config::{ConfigFairing, DatabaseFairing};
use logging::LoggerFairing;
use mail::MailerFairing;
use model::db::election::StatusSchedulerFairing;

/// Assemble the server. Fairings run on ignition in the order they are
/// attached, and the scheduler depends on the database, so order matters.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(MailerFairing)
        .attach(StatusSchedulerFairing)
        .manage(ElectionEvents::new())
        .mount("/api", api::routes())
        .register("/", api::catchers())
}

/// Assemble a server around an existing database connection, skipping the
/// database fairing and its admin bootstrap.
#[cfg(test)]
pub(crate) async fn rocket_for_db(client: mongodb::Client, db_name: &str) -> Rocket<Build> {
    let db = client.database(db_name);
    model::mongodb::ensure_indexes_exist(&db)
        .await
        .expect("Failed to create test indexes");

    rocket::build()
        .attach(ConfigFairing)
        .attach(MailerFairing)
        .attach(StatusSchedulerFairing)
        .manage(client)
        .manage(db)
        .manage(ElectionEvents::new())
        .mount("/api", api::routes())
        .register("/", api::catchers())
}

/// A database client for tests, configured to give up quickly when no server is running.
#[cfg(test)]
pub(crate) async fn db_client() -> mongodb::Client {
    let db_uri = rocket::Config::figment()
        .extract_inner::<String>("db_uri")
        .expect("`db_uri` not set");
    let mut options = mongodb::options::ClientOptions::parse(&db_uri)
        .await
        .expect("Invalid `db_uri`");
    options.server_selection_timeout = Some(std::time::Duration::from_secs(2));
    mongodb::Client::with_options(options).expect("Failed to create database client")
}

/// A fresh database name for a single test.
#[cfg(test)]
pub(crate) fn database() -> String {
    config::get_database_name()
}
