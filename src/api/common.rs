use std::collections::HashSet;

use mongodb::bson::doc;
use rocket::futures::TryStreamExt;

use crate::error::{Error, Result};
use crate::model::{
    api::auth::AuthToken,
    db::{election::Election, user::User, vote::Vote},
    mongodb::{Coll, Id},
};

/// Parse an ID supplied in a request body.
pub fn parse_id(id: &str, what: &str) -> Result<Id> {
    id.parse()
        .map_err(|_| Error::bad_request(format!("Invalid {what} ID '{id}'")))
}

/// Get an election the token holder may manage: admins manage every
/// election, organizers only their own. Others' elections are reported as
/// missing rather than forbidden.
pub async fn managed_election(
    token: &AuthToken<User>,
    election_id: Id,
    elections: &Coll<Election>,
) -> Result<Election> {
    elections
        .find_one(election_id.as_doc(), None)
        .await?
        .filter(|election| token.is_admin() || election.owner_id == token.id)
        .ok_or_else(|| Error::not_found(format!("Election {election_id}")))
}

/// Get the account behind a token.
pub async fn token_account(token: &AuthToken<User>, users: &Coll<User>) -> Result<User> {
    users
        .find_one(token.id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("User {}", token.id)))
}

/// The IDs of every voter who has voted in the given election.
pub async fn voters_who_voted(votes: &Coll<Vote>, election_id: Id) -> Result<HashSet<Id>> {
    let filter = doc! { "election_id": election_id };
    let voted: HashSet<Id> = votes
        .find(filter, None)
        .await?
        .map_ok(|vote| vote.voter_id)
        .try_collect()
        .await?;
    Ok(voted)
}
