use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{
        ballot::{Answer, Question},
        election::ElectionStatus,
    },
    db::{election::Election, vote::Vote},
};

/// The ballot as presented to a voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotDescription {
    pub election_id: String,
    pub title: String,
    pub description: String,
    pub status: ElectionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub questions: Vec<Question>,
    pub has_voted: bool,
}

impl BallotDescription {
    pub fn new(election: Election, has_voted: bool) -> Self {
        Self {
            election_id: election.id.to_string(),
            title: election.election.title,
            description: election.election.description,
            status: election.election.status,
            start_time: election.election.start_time,
            end_time: election.election.end_time,
            questions: election.election.questions,
            has_voted,
        }
    }
}

/// A voter's answers to every question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BallotSubmission {
    pub answers: Vec<Answer>,
}

/// Proof that a ballot was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub vote_id: String,
    pub election_id: String,
    pub cast_at: DateTime<Utc>,
}

impl From<Vote> for Receipt {
    fn from(vote: Vote) -> Self {
        Self {
            vote_id: vote.id.to_string(),
            election_id: vote.election_id.to_string(),
            cast_at: vote.cast_at,
        }
    }
}
