use std::fmt::Display;

use argon2::Error as Argon2Error;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use log::{debug, error};
use mongodb::{bson::ser::Error as BsonError, error::Error as DbError};
use reqwest::Error as HttpError;
use rocket::{
    http::{Status, StatusClass},
    response::{self, status::Custom, Responder},
    serde::json::Json,
    Request,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::request_id;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Bson(#[from] BsonError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error("Mail delivery failed: {0}")]
    Mail(#[from] HttpError),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    pub fn not_found(what: impl Display) -> Self {
        Self::Status(Status::NotFound, format!("{what} not found"))
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::Status(Status::BadRequest, reason.into())
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Status(Status::Unauthorized, reason.into())
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Status(Status::Forbidden, reason.into())
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Status(Status::Conflict, reason.into())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Status(Status::InternalServerError, reason.into())
    }

    /// The HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::Db(_) | Self::Bson(_) | Self::Argon2(_) | Self::Mail(_) => {
                Status::InternalServerError
            }
            Self::Jwt(err) => match err.kind() {
                JwtErrorKind::ExpiredSignature
                | JwtErrorKind::ImmatureSignature
                | JwtErrorKind::InvalidSignature => Status::Unauthorized,
                _ => Status::BadRequest,
            },
            Self::Status(status, _) => *status,
        }
    }
}

/// The JSON body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        let id = request_id(req);
        let message = if status.class() == StatusClass::ServerError {
            // Internal details stay in the log.
            error!("req{id}: {self}");
            status.reason_lossy().to_string()
        } else {
            debug!("req{id}: {self}");
            self.to_string()
        };
        Custom(status, Json(ErrorBody::new(message))).respond_to(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helper_statuses() {
        assert_eq!(Error::not_found("Election 1").status(), Status::NotFound);
        assert_eq!(Error::bad_request("nope").status(), Status::BadRequest);
        assert_eq!(Error::unauthorized("nope").status(), Status::Unauthorized);
        assert_eq!(Error::forbidden("nope").status(), Status::Forbidden);
        assert_eq!(Error::conflict("nope").status(), Status::Conflict);
        assert_eq!(
            Error::internal("nope").status(),
            Status::InternalServerError
        );
    }

    #[test]
    fn not_found_message() {
        assert_eq!(
            Error::not_found("Election 42").to_string(),
            "Election 42 not found"
        );
    }

    #[test]
    fn expired_jwt_is_unauthorized() {
        let err: Error = JwtError::from(JwtErrorKind::ExpiredSignature).into();
        assert_eq!(err.status(), Status::Unauthorized);
        let err: Error = JwtError::from(JwtErrorKind::InvalidToken).into();
        assert_eq!(err.status(), Status::BadRequest);
    }
}
