use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// A review of the platform left by an account holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewCore {
    pub user_id: Id,
    /// The author's name when the review was written.
    pub author_name: String,
    /// 1 to 5 stars.
    pub rating: u8,
    pub comment: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// A review without an ID.
pub type NewReview = ReviewCore;

/// A review from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub review: ReviewCore,
}

impl Deref for Review {
    type Target = ReviewCore;

    fn deref(&self) -> &Self::Target {
        &self.review
    }
}
