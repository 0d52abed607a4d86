use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{ballot::Question, election::ElectionStatus},
    db::election::{Election, Voter},
    mongodb::Id,
};

/// Everything an election's owner sees about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDescription {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub status: ElectionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub questions: Vec<Question>,
    pub voters: Vec<VoterDescription>,
    pub vote_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ElectionDescription {
    /// Describe an election, given the IDs of the voters who have voted.
    pub fn new(election: Election, voted: &HashSet<Id>) -> Self {
        let voters = election
            .election
            .voters
            .into_iter()
            .map(|voter| {
                let has_voted = voted.contains(&voter.id);
                VoterDescription::new(voter, has_voted)
            })
            .collect();
        Self {
            id: election.id.to_string(),
            owner_id: election.election.owner_id.to_string(),
            title: election.election.title,
            description: election.election.description,
            status: election.election.status,
            start_time: election.election.start_time,
            end_time: election.election.end_time,
            questions: election.election.questions,
            voters,
            vote_count: voted.len() as u64,
            created_at: election.election.created_at,
            updated_at: election.election.updated_at,
        }
    }
}

/// A summary of an election, shorter than the full `ElectionDescription`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSummary {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub status: ElectionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub question_count: usize,
    pub voter_count: usize,
}

impl From<Election> for ElectionSummary {
    fn from(election: Election) -> Self {
        Self {
            id: election.id.to_string(),
            owner_id: election.owner_id.to_string(),
            question_count: election.questions.len(),
            voter_count: election.voters.len(),
            title: election.election.title,
            description: election.election.description,
            status: election.election.status,
            start_time: election.election.start_time,
            end_time: election.election.end_time,
        }
    }
}

/// A registered voter, as seen by the election's owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterDescription {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub invited: bool,
    pub has_voted: bool,
}

impl VoterDescription {
    pub fn new(voter: Voter, has_voted: bool) -> Self {
        Self {
            id: voter.id.to_string(),
            email: voter.email.into(),
            name: voter.name,
            invited: voter.invited,
            has_voted,
        }
    }
}

/// A voter's access key, for the election's owner to pass on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKeyDescription {
    pub voter_id: String,
    pub email: String,
    pub access_key: String,
}

/// The outcome of e-mailing access keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteReport {
    pub invited: usize,
}
