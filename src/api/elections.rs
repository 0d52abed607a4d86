use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::{info, warn};
use mongodb::{
    bson::{doc, to_bson, DateTime as BsonDateTime},
    options::FindOptions,
};
use rocket::{futures::TryStreamExt, http::Status, serde::json::Json, Route, State};

use crate::{
    api::common::{managed_election, voters_who_voted},
    error::{Error, Result},
    events::ElectionEvents,
    mail::{Mail, Mailer},
    model::{
        api::{
            auth::{Admin, AuthToken},
            election::{
                merge_voters, AccessKeyDescription, ElectionDescription, ElectionSpec,
                ElectionSummary, InviteReport, SpecError, VoterDescription, VoterSpec,
            },
        },
        common::{
            access_key::derive_access_key,
            election::{ElectionStatus, TransitionError},
        },
        db::{
            election::{Election, NewElection, StatusChange, StatusScheduler, Voter},
            user::User,
            vote::{has_votes, Vote},
        },
        mongodb::{Coll, Id},
    },
    Config,
};

pub fn routes() -> Vec<Route> {
    routes![
        list_elections,
        create_election,
        get_election,
        update_election,
        delete_election,
        launch_election,
        revert_election,
        list_voters,
        add_voters,
        remove_voter,
        voter_key,
        invite_voters,
        sweep_elections,
    ]
}

fn spec_error(e: SpecError) -> Error {
    Error::bad_request(e.to_string())
}

/// BSON keeps datetimes to the millisecond.
fn same_instant(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.timestamp_millis() == b.timestamp_millis()
}

async fn describe(election: Election, votes: &Coll<Vote>) -> Result<ElectionDescription> {
    let voted = voters_who_voted(votes, election.id).await?;
    Ok(ElectionDescription::new(election, &voted))
}

#[get("/elections?<status>")]
async fn list_elections(
    token: AuthToken<User>,
    status: Option<ElectionStatus>,
    elections: Coll<Election>,
) -> Result<Json<Vec<ElectionSummary>>> {
    let mut filter = doc! {};
    if !token.is_admin() {
        filter.insert("owner_id", token.id);
    }
    if let Some(status) = status {
        filter.insert("status", status);
    }
    let options = FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .build();
    let summaries = elections
        .find(filter, options)
        .await?
        .map_ok(ElectionSummary::from)
        .try_collect()
        .await?;
    Ok(Json(summaries))
}

#[post("/elections", data = "<spec>", format = "json")]
async fn create_election(
    token: AuthToken<User>,
    spec: Json<ElectionSpec>,
    new_elections: Coll<NewElection>,
    events: &State<ElectionEvents>,
) -> Result<(Status, Json<ElectionDescription>)> {
    let election = spec.0.into_election(token.id).map_err(spec_error)?;
    let election_id: Id = new_elections
        .insert_one(&election, None)
        .await?
        .inserted_id
        .as_object_id()
        .ok_or_else(|| Error::internal("Inserted election has no ObjectId"))?
        .into();
    info!("Created election {election_id} '{}'", election.title);
    events.elections_changed();

    let election = Election {
        id: election_id,
        election,
    };
    Ok((
        Status::Created,
        Json(ElectionDescription::new(election, &HashSet::new())),
    ))
}

#[get("/elections/<election_id>")]
async fn get_election(
    token: AuthToken<User>,
    election_id: Id,
    elections: Coll<Election>,
    votes: Coll<Vote>,
) -> Result<Json<ElectionDescription>> {
    let election = managed_election(&token, election_id, &elections).await?;
    Ok(Json(describe(election, &votes).await?))
}

#[put("/elections/<election_id>", data = "<spec>", format = "json")]
#[allow(clippy::too_many_arguments)]
async fn update_election(
    token: AuthToken<User>,
    election_id: Id,
    spec: Json<ElectionSpec>,
    elections: Coll<Election>,
    new_elections: Coll<NewElection>,
    votes: Coll<Vote>,
    scheduler: &State<StatusScheduler>,
    events: &State<ElectionEvents>,
) -> Result<Json<ElectionDescription>> {
    let election = managed_election(&token, election_id, &elections).await?;
    let spec = spec.0;
    spec.validate_metadata().map_err(spec_error)?;
    let questions = spec.to_questions().map_err(spec_error)?;
    let mut voters = election.voters.clone();
    let added = merge_voters(&mut voters, &spec.voters).map_err(spec_error)?;
    if added > 0 && election.status.is_closed() {
        return Err(Error::conflict("Cannot add voters after voting has closed"));
    }

    // Once votes exist, only a draft may change its ballot or window.
    let voted = has_votes(&votes, election_id).await?;
    let new_ballot = questions != election.questions;
    if voted && election.status != ElectionStatus::Draft {
        let same_window = same_instant(spec.start_time, election.start_time)
            && same_instant(spec.end_time, election.end_time);
        if new_ballot || !same_window {
            return Err(Error::conflict(
                "Votes have been cast, so the ballot and voting window are locked. \
                 Revert the election to a draft to change them",
            ));
        }
    }

    let now = Utc::now();
    let mut updated = election.election.clone();
    updated.title = spec.title.trim().to_string();
    updated.description = spec.description.trim().to_string();
    updated.start_time = spec.start_time;
    updated.end_time = spec.end_time;
    updated.questions = questions;
    updated.voters = voters;
    // Questions and options are renumbered, so old votes would be counted
    // against the wrong choices.
    let discard_votes = voted && new_ballot;
    if discard_votes {
        updated.ballots_admitted = 0;
    }
    updated.status = election.status.refreshed(
        now,
        spec.start_time,
        spec.end_time,
        voted && !discard_votes,
    );
    updated.updated_at = now;

    // Lose to the scheduler, a launch or an admitted ballot rather than
    // overwrite them.
    let filter = doc! {
        "_id": election_id,
        "status": election.status,
        "ballots_admitted": election.ballots_admitted,
    };
    let result = new_elections.replace_one(filter, &updated, None).await?;
    if result.matched_count == 0 {
        return Err(Error::conflict(
            "Election changed while it was being updated, please retry",
        ));
    }
    if discard_votes {
        let deleted = votes
            .delete_many(doc! { "election_id": election_id }, None)
            .await?;
        warn!(
            "Discarded {} votes cast against the old ballot of election {election_id}",
            deleted.deleted_count
        );
    }
    info!("Updated election {election_id}");

    let election = Election {
        id: election_id,
        election: updated,
    };
    scheduler.schedule(&election).await;
    events.elections_changed();
    Ok(Json(describe(election, &votes).await?))
}

#[delete("/elections/<election_id>")]
async fn delete_election(
    token: AuthToken<User>,
    election_id: Id,
    elections: Coll<Election>,
    votes: Coll<Vote>,
    scheduler: &State<StatusScheduler>,
    events: &State<ElectionEvents>,
) -> Result<()> {
    let election = managed_election(&token, election_id, &elections).await?;
    scheduler.cancel(election.id).await;

    let deleted = votes
        .delete_many(doc! { "election_id": election.id }, None)
        .await?;
    elections.delete_one(election.id.as_doc(), None).await?;
    info!(
        "Deleted election {election_id} and its {} votes",
        deleted.deleted_count
    );
    events.elections_changed();
    Ok(())
}

#[post("/elections/<election_id>/launch")]
async fn launch_election(
    token: AuthToken<User>,
    election_id: Id,
    elections: Coll<Election>,
    votes: Coll<Vote>,
    scheduler: &State<StatusScheduler>,
    events: &State<ElectionEvents>,
) -> Result<Json<ElectionDescription>> {
    let mut election = managed_election(&token, election_id, &elections).await?;
    if election.questions.is_empty() {
        return Err(Error::bad_request("Add a question before launching"));
    }
    if election.voters.is_empty() {
        return Err(Error::bad_request("Add a voter before launching"));
    }

    let now = Utc::now();
    let status = election
        .status
        .launched(now, election.start_time, election.end_time)
        .map_err(|e| match e {
            TransitionError::AlreadyLaunched(_) => Error::conflict(e.to_string()),
            TransitionError::WindowClosed => Error::bad_request(e.to_string()),
        })?;

    let filter = doc! {
        "_id": election_id,
        "status": election.status,
    };
    let update = doc! {
        "$set": {
            "status": status,
            "updated_at": BsonDateTime::from_chrono(now),
        }
    };
    let result = elections.update_one(filter, update, None).await?;
    if result.matched_count == 0 {
        return Err(Error::conflict(
            "Election changed while it was being launched, please retry",
        ));
    }
    info!("Launched election {election_id}, now {status}");

    election.status = status;
    election.updated_at = now;
    scheduler.schedule(&election).await;
    events.elections_changed();
    Ok(Json(describe(election, &votes).await?))
}

#[post("/elections/<election_id>/draft")]
async fn revert_election(
    token: AuthToken<User>,
    election_id: Id,
    elections: Coll<Election>,
    votes: Coll<Vote>,
    scheduler: &State<StatusScheduler>,
    events: &State<ElectionEvents>,
) -> Result<Json<ElectionDescription>> {
    let mut election = managed_election(&token, election_id, &elections).await?;
    scheduler.cancel(election_id).await;

    let now = Utc::now();
    let update = doc! {
        "$set": {
            "status": ElectionStatus::Draft,
            "updated_at": BsonDateTime::from_chrono(now),
        }
    };
    elections
        .update_one(election_id.as_doc(), update, None)
        .await?;
    if election.status != ElectionStatus::Draft {
        info!("Reverted election {election_id} from {} to draft", election.status);
    }

    election.status = ElectionStatus::Draft;
    election.updated_at = now;
    events.elections_changed();
    Ok(Json(describe(election, &votes).await?))
}

#[get("/elections/<election_id>/voters")]
async fn list_voters(
    token: AuthToken<User>,
    election_id: Id,
    elections: Coll<Election>,
    votes: Coll<Vote>,
) -> Result<Json<Vec<VoterDescription>>> {
    let election = managed_election(&token, election_id, &elections).await?;
    Ok(Json(describe(election, &votes).await?.voters))
}

#[post("/elections/<election_id>/voters", data = "<voters>", format = "json")]
async fn add_voters(
    token: AuthToken<User>,
    election_id: Id,
    voters: Json<Vec<VoterSpec>>,
    elections: Coll<Election>,
    votes: Coll<Vote>,
) -> Result<Json<Vec<VoterDescription>>> {
    let mut election = managed_election(&token, election_id, &elections).await?;
    if election.status.is_closed() {
        return Err(Error::conflict("Cannot add voters after voting has closed"));
    }

    let existing = election.voters.len();
    let added = merge_voters(&mut election.voters, &voters).map_err(spec_error)?;
    if added > 0 {
        let new_voters: Vec<&Voter> = election.voters[existing..].iter().collect();
        let update = doc! {
            "$push": { "voters": { "$each": to_bson(&new_voters)? } },
            "$set": { "updated_at": BsonDateTime::from_chrono(Utc::now()) },
        };
        elections
            .update_one(election_id.as_doc(), update, None)
            .await?;
        info!("Added {added} voters to election {election_id}");
    }
    Ok(Json(describe(election, &votes).await?.voters))
}

#[delete("/elections/<election_id>/voters/<voter_id>")]
async fn remove_voter(
    token: AuthToken<User>,
    election_id: Id,
    voter_id: Id,
    elections: Coll<Election>,
    votes: Coll<Vote>,
) -> Result<()> {
    let election = managed_election(&token, election_id, &elections).await?;
    if election.voter(voter_id).is_none() {
        return Err(Error::not_found(format!("Voter {voter_id}")));
    }
    let voted = votes
        .count_documents(
            doc! { "election_id": election_id, "voter_id": voter_id },
            None,
        )
        .await?;
    if voted > 0 {
        return Err(Error::conflict("Cannot remove a voter who has voted"));
    }

    let update = doc! {
        "$pull": { "voters": { "id": voter_id } },
        "$set": { "updated_at": BsonDateTime::from_chrono(Utc::now()) },
    };
    elections
        .update_one(election_id.as_doc(), update, None)
        .await?;
    info!("Removed voter {voter_id} from election {election_id}");
    Ok(())
}

#[get("/elections/<election_id>/voters/<voter_id>/key")]
async fn voter_key(
    token: AuthToken<User>,
    election_id: Id,
    voter_id: Id,
    elections: Coll<Election>,
    config: &State<Config>,
) -> Result<Json<AccessKeyDescription>> {
    let election = managed_election(&token, election_id, &elections).await?;
    let voter = election
        .voter(voter_id)
        .ok_or_else(|| Error::not_found(format!("Voter {voter_id}")))?;
    Ok(Json(AccessKeyDescription {
        voter_id: voter.id.to_string(),
        email: voter.email.to_string(),
        access_key: derive_access_key(config.hmac_secret(), election.id, &voter.email),
    }))
}

fn invitation(election: &Election, voter: &Voter, config: &Config) -> Mail {
    let access_key = derive_access_key(config.hmac_secret(), election.id, &voter.email);
    let greeting = match &voter.name {
        Some(name) => format!("Hello {name},"),
        None => "Hello,".to_string(),
    };
    let text = format!(
        "{greeting}\n\n\
         You have been invited to vote in \"{title}\".\n\
         Voting opens {start} and closes {end} (UTC).\n\n\
         Election ID: {id}\n\
         Access key: {access_key}\n\n\
         Cast your vote at {frontend}/vote/{id}\n",
        title = election.title,
        start = election.start_time.format("%Y-%m-%d %H:%M"),
        end = election.end_time.format("%Y-%m-%d %H:%M"),
        id = election.id,
        frontend = config.frontend_url(),
    );
    Mail::new(
        voter.email.to_string(),
        format!("Your invitation to vote: {}", election.title),
        text,
    )
}

#[post("/elections/<election_id>/voters/invite")]
async fn invite_voters(
    token: AuthToken<User>,
    election_id: Id,
    elections: Coll<Election>,
    mailer: &State<Mailer>,
    config: &State<Config>,
) -> Result<Json<InviteReport>> {
    let election = managed_election(&token, election_id, &elections).await?;
    if election.status.is_closed() {
        return Err(Error::conflict("Voting has closed for this election"));
    }

    let mut invited = 0;
    for voter in election.voters.iter().filter(|voter| !voter.invited) {
        if let Err(e) = mailer.send(invitation(&election, voter, config)).await {
            warn!("Invitations for election {election_id} stopped after {invited}");
            return Err(e);
        }
        let filter = doc! {
            "_id": election_id,
            "voters.id": voter.id,
        };
        let update = doc! { "$set": { "voters.$.invited": true } };
        elections.update_one(filter, update, None).await?;
        invited += 1;
    }
    info!("Invited {invited} voters to election {election_id}");
    Ok(Json(InviteReport { invited }))
}

#[post("/elections/sweep")]
async fn sweep_elections(
    _token: AuthToken<Admin>,
    scheduler: &State<StatusScheduler>,
) -> Result<Json<Vec<StatusChange>>> {
    Ok(Json(scheduler.sweep().await?))
}
