use log::{error, info, LevelFilter};
use rocket::Error as RocketError;
use thiserror::Error;

/// Logging configuration, relative to the working directory.
const LOG_CONFIG: &str = "log4rs.yaml";

/// Errors that stop the server from starting or running.
#[derive(Debug, Error)]
enum LaunchError {
    #[error("Failed to initialise logging: {0}")]
    Logging(String),
    #[error(transparent)]
    Rocket(#[from] RocketError),
}

async fn serve() -> Result<(), LaunchError> {
    info!(
        "Starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
    let rocket = election_backend::build().ignite().await?;
    info!("Server configured, status scheduler running");
    // Rocket's own per-request logging duplicates the logger fairing.
    log4rs_dynamic_filters::DynamicLevelFilter::set("rocket", LevelFilter::Off);
    let _ = rocket.launch().await?;
    info!("Server stopped");
    Ok(())
}

#[rocket::main]
async fn main() {
    let result = match log4rs::init_file(LOG_CONFIG, log4rs_dynamic_filters::default_deserializers()) {
        Ok(()) => serve().await,
        Err(e) => Err(LaunchError::Logging(e.to_string())),
    };
    if let Err(err) = result {
        // Logging may not be up, so report on stderr too.
        eprintln!("{err}");
        error!("{err}");
        error!("Critical failure, shutting down");
        std::process::exit(1)
    }
}
