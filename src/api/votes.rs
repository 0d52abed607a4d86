use chrono::Utc;
use log::{debug, info, warn};
use mongodb::bson::doc;
use rocket::{futures::TryStreamExt, http::Status, serde::json::Json, Route, State};

use crate::{
    api::common::parse_id,
    error::{Error, Result},
    model::{
        api::{
            auth::{AuthToken, Claims, Role, VoterAuthResponse, VoterLoginRequest},
            ballot::{BallotDescription, BallotSubmission, Receipt},
            results::ElectionResults,
        },
        common::{
            access_key::verify_access_key, ballot::validate_answers, election::ElectionStatus,
            email::Email,
        },
        db::{
            election::{Election, Voter},
            user::User,
            vote::{admit_ballot, release_ballot, NewVote, Vote},
        },
        mongodb::{is_duplicate_key_error, Coll, Id},
    },
    Config,
};

pub fn routes() -> Vec<Route> {
    routes![voter_login, get_ballot, cast_vote, election_results]
}

/// Get the election a voter token is scoped to.
async fn voter_election(token: &AuthToken<Voter>, elections: &Coll<Election>) -> Result<Election> {
    let election_id = token.election_id()?;
    elections
        .find_one(election_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election {election_id}")))
}

#[post("/votes/login", data = "<credentials>", format = "json")]
async fn voter_login(
    credentials: Json<VoterLoginRequest>,
    elections: Coll<Election>,
    config: &State<Config>,
) -> Result<Json<VoterAuthResponse>> {
    let no_match = || Error::unauthorized("No voter matches that election, e-mail and access key");

    let election_id = parse_id(&credentials.election_id, "election")?;
    let email: Email = credentials.email.parse().map_err(|_| no_match())?;
    let election = elections
        .find_one(election_id.as_doc(), None)
        .await?
        .ok_or_else(no_match)?;
    let voter = election
        .voter_by_email(&email)
        .filter(|voter| {
            verify_access_key(
                config.hmac_secret(),
                election.id,
                &voter.email,
                &credentials.access_key,
            )
        })
        .ok_or_else(no_match)?;
    if election.status == ElectionStatus::Draft {
        return Err(Error::forbidden("This election has not been launched yet"));
    }

    let token = Claims::for_voter(election.id, voter, config).encode(config)?;
    debug!("Voter {} logged in to election {}", voter.id, election.id);
    Ok(Json(VoterAuthResponse {
        token,
        election_id: election.id.to_string(),
        voter_id: voter.id.to_string(),
    }))
}

#[get("/votes/ballot")]
async fn get_ballot(
    token: AuthToken<Voter>,
    elections: Coll<Election>,
    votes: Coll<Vote>,
) -> Result<Json<BallotDescription>> {
    let election = voter_election(&token, &elections).await?;
    let filter = doc! {
        "election_id": election.id,
        "voter_id": token.id,
    };
    let has_voted = votes.count_documents(filter, None).await? > 0;
    Ok(Json(BallotDescription::new(election, has_voted)))
}

#[post("/votes", data = "<ballot>", format = "json")]
async fn cast_vote(
    token: AuthToken<Voter>,
    ballot: Json<BallotSubmission>,
    elections: Coll<Election>,
    new_votes: Coll<NewVote>,
    votes: Coll<Vote>,
) -> Result<(Status, Json<Receipt>)> {
    let election = voter_election(&token, &elections).await?;
    let now = Utc::now();
    if !election.status.accepts_votes(now, election.end_time) {
        return Err(Error::forbidden(format!(
            "Election is {}, not accepting votes",
            election.status
        )));
    }
    let answers = validate_answers(&election.questions, ballot.0.answers)
        .map_err(|e| Error::bad_request(e.to_string()))?;

    let changed = || {
        Error::conflict("The election changed before your ballot was recorded, please reload it")
    };
    if !admit_ballot(&elections, &election, now).await? {
        return Err(changed());
    }

    let vote = NewVote::new(election.id, token.id, answers);
    let result = new_votes.insert_one(&vote, None).await;
    if result.is_err() {
        release(&elections, election.id).await;
    }
    if is_duplicate_key_error(result.as_ref()) {
        return Err(Error::conflict("You have already voted in this election"));
    }
    let vote_id: Id = result?
        .inserted_id
        .as_object_id()
        .ok_or_else(|| Error::internal("Inserted vote has no ObjectId"))?
        .into();

    // A revert and a ballot edit may have overtaken the admission.
    let current = voter_election(&token, &elections).await?;
    if current.questions != election.questions {
        votes.delete_one(vote_id.as_doc(), None).await?;
        release(&elections, election.id).await;
        warn!("Discarded vote {vote_id} cast against an outdated ballot");
        return Err(changed());
    }
    info!("Recorded vote {vote_id} in election {}", election.id);

    let vote = Vote { id: vote_id, vote };
    Ok((Status::Created, Json(vote.into())))
}

/// Release an admitted ballot, logging rather than reporting a failure.
async fn release(elections: &Coll<Election>, election_id: Id) {
    if let Err(e) = release_ballot(elections, election_id).await {
        warn!("Failed to release a ballot in election {election_id}: {e}");
    }
}

/// May the bearer of these claims see the results of this election?
async fn may_see_results(claims: &Claims, election: &Election, users: &Coll<User>) -> Result<bool> {
    let subject = claims.subject()?;
    if claims.role == Role::Voter {
        let registered = claims.election_id()? == Some(election.id)
            && election.voter(subject).is_some();
        return Ok(registered && election.status.is_closed());
    }

    // Account roles are re-read, as in the `AuthToken` guard.
    let account = users
        .find_one(subject.as_doc(), None)
        .await?
        .ok_or_else(|| Error::unauthorized("Account no longer exists"))?;
    Ok(account.role == Role::Admin || election.owner_id == account.id)
}

#[get("/votes/results/<election_id>")]
async fn election_results(
    claims: Claims,
    election_id: Id,
    elections: Coll<Election>,
    votes: Coll<Vote>,
    users: Coll<User>,
) -> Result<Json<ElectionResults>> {
    let election = elections
        .find_one(election_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election {election_id}")))?;
    if !may_see_results(&claims, &election, &users).await? {
        return Err(Error::forbidden("Results are not available to you yet"));
    }

    let ballots: Vec<Vote> = votes
        .find(doc! { "election_id": election_id }, None)
        .await?
        .try_collect()
        .await?;
    let results = ElectionResults::new(&election, ballots.iter().map(|v| v.answers.as_slice()));
    Ok(Json(results))
}
