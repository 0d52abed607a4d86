use std::{fmt::Display, ops::Deref, str::FromStr};

use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A normalised e-mail address: trimmed, lower-cased, and shaped like
/// `local@domain.tld`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid e-mail address: '{0}'")]
pub struct InvalidEmail(pub String);

impl FromStr for Email {
    type Err = InvalidEmail;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_lowercase();
        let (local, domain) = normalised
            .split_once('@')
            .ok_or_else(|| InvalidEmail(s.to_string()))?;
        let valid = !local.is_empty()
            && !domain.contains('@')
            && !normalised.chars().any(char::is_whitespace)
            && domain
                .split_once('.')
                .map_or(false, |(host, _)| !host.is_empty())
            && !domain.ends_with('.');
        if valid && normalised.len() <= 254 {
            Ok(Self(normalised))
        } else {
            Err(InvalidEmail(s.to_string()))
        }
    }
}

impl TryFrom<String> for Email {
    type Error = InvalidEmail;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

impl From<Email> for Bson {
    fn from(email: Email) -> Self {
        Bson::String(email.0)
    }
}

impl Deref for Email {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
