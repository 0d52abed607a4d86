use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{common::email::Email, mongodb::Id};

/// A message submitted through the contact form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactMessageCore {
    pub name: String,
    pub email: Email,
    pub subject: String,
    pub message: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub received_at: DateTime<Utc>,
}

/// A contact message without an ID.
pub type NewContactMessage = ContactMessageCore;

/// A contact message from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactMessage {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub message: ContactMessageCore,
}

impl Deref for ContactMessage {
    type Target = ContactMessageCore;

    fn deref(&self) -> &Self::Target {
        &self.message
    }
}
