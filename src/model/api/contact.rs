use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::db::contact::ContactMessage;

/// A message submitted through the contact form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDescription {
    pub id: String,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub received_at: DateTime<Utc>,
}

impl From<ContactMessage> for ContactDescription {
    fn from(message: ContactMessage) -> Self {
        Self {
            id: message.id.to_string(),
            name: message.message.name,
            email: message.message.email.into(),
            subject: message.message.subject,
            message: message.message.message,
            received_at: message.message.received_at,
        }
    }
}
