use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::{
    bson::{
        doc, serde_helpers::chrono_datetime_as_bson_datetime, to_bson, DateTime as BsonDateTime,
    },
    options::CountOptions,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    model::{
        common::{ballot::Answer, election::ElectionStatus},
        db::election::Election,
        mongodb::{Coll, Id},
    },
};

/// Core vote data, as stored in the database.
///
/// The `(election_id, voter_id)` pair is unique, so inserting a second
/// vote for the same voter fails with a duplicate key error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCore {
    pub election_id: Id,
    pub voter_id: Id,
    pub answers: Vec<Answer>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
}

impl VoteCore {
    pub fn new(election_id: Id, voter_id: Id, answers: Vec<Answer>) -> Self {
        Self {
            election_id,
            voter_id,
            answers,
            cast_at: Utc::now(),
        }
    }
}

/// A vote without an ID.
pub type NewVote = VoteCore;

/// A vote from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub vote: VoteCore,
}

impl Deref for Vote {
    type Target = VoteCore;

    fn deref(&self) -> &Self::Target {
        &self.vote
    }
}

/// Has any vote been cast in the given election?
pub async fn has_votes(votes: &Coll<Vote>, election_id: Id) -> Result<bool> {
    let options = CountOptions::builder().limit(1).build();
    let count = votes
        .count_documents(doc! { "election_id": election_id }, options)
        .await?;
    Ok(count > 0)
}

/// Admit one ballot into `election` before its vote is stored.
///
/// Succeeds only while the election is live, its window is open at `now`
/// and its questions are still the ones the ballot was checked against.
/// Returns false if the election has moved on.
pub async fn admit_ballot(
    elections: &Coll<Election>,
    election: &Election,
    now: DateTime<Utc>,
) -> Result<bool> {
    let filter = doc! {
        "_id": election.id,
        "status": ElectionStatus::Live,
        "end_time": { "$gt": BsonDateTime::from_chrono(now) },
        "questions": to_bson(&election.questions)?,
    };
    let update = doc! { "$inc": { "ballots_admitted": 1 } };
    let result = elections.update_one(filter, update, None).await?;
    Ok(result.matched_count == 1)
}

/// Take back a ballot admitted with [`admit_ballot`] whose vote was not kept.
/// A ballot edit may already have reset the count, which never drops below zero.
pub async fn release_ballot(elections: &Coll<Election>, election_id: Id) -> Result<()> {
    let filter = doc! {
        "_id": election_id,
        "ballots_admitted": { "$gt": 0 },
    };
    let update = doc! { "$inc": { "ballots_admitted": -1 } };
    elections.update_one(filter, update, None).await?;
    Ok(())
}
