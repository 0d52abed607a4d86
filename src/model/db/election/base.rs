use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{ballot::Question, election::ElectionStatus, email::Email},
    mongodb::Id,
};

/// Core election data, as stored in the database.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ElectionCore {
    /// The account that created the election.
    pub owner_id: Id,
    pub title: String,
    pub description: String,
    pub status: ElectionStatus,
    /// Voting opens at this instant.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    /// Voting closes at this instant.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
    pub questions: Vec<Question>,
    pub voters: Vec<Voter>,
    /// Ballots let through to be stored. Raised before each vote is written,
    /// on the same document whose status the scheduler closes, so a closing
    /// election either counts a ballot in flight or turns it away.
    #[serde(default)]
    pub ballots_admitted: i64,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl ElectionCore {
    /// Find a registered voter by ID.
    pub fn voter(&self, voter_id: Id) -> Option<&Voter> {
        self.voters.iter().find(|voter| voter.id == voter_id)
    }

    /// Find a registered voter by e-mail.
    pub fn voter_by_email(&self, email: &Email) -> Option<&Voter> {
        self.voters.iter().find(|voter| &voter.email == email)
    }
}

/// An election without an ID.
pub type NewElection = ElectionCore;

/// An election from the database, with its unique ID.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

impl DerefMut for Election {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.election
    }
}

/// An invitee of an election.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Voter {
    pub id: Id,
    pub email: Email,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Has the voter been e-mailed their access key?
    #[serde(default)]
    pub invited: bool,
}

impl Voter {
    pub fn new(email: Email, name: Option<String>) -> Self {
        Self {
            id: Id::new(),
            email,
            name,
            invited: false,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voter_lookup() {
        let election = ElectionCore::draft_example(Id::new());
        let first = &election.voters[0];
        assert_eq!(election.voter(first.id), Some(first));
        assert_eq!(election.voter_by_email(&Email::example()), Some(first));
        assert_eq!(election.voter(Id::new()), None);
    }
}
