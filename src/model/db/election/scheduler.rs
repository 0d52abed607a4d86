use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, trace, warn};
use mongodb::{
    bson::{bson, doc, DateTime as BsonDateTime},
    options::{FindOneAndUpdateOptions, ReturnDocument},
    Database,
};
use rocket::{
    fairing::{Fairing, Info, Kind},
    futures::{
        future::{BoxFuture, FutureExt},
        TryStreamExt,
    },
    tokio::sync::Mutex,
    Build, Rocket,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    events::ElectionEvents,
    model::{
        common::election::ElectionStatus,
        db::{
            election::Election,
            vote::{has_votes, Vote},
        },
        mongodb::{Coll, Id},
    },
    scheduled_task::ScheduledTask,
};

/// Delay before a failed status evaluation is attempted again.
const RETRY_INTERVAL_SECONDS: i64 = 60;

/// A status change applied to an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub election_id: String,
    pub from: ElectionStatus,
    pub to: ElectionStatus,
}

/// A pending status evaluation. The token tells a running task whether it
/// is still the current one for its election.
struct Entry {
    token: u64,
    task: ScheduledTask<()>,
}

type TaskMap = HashMap<Id, Entry>;

fn next_token() -> u64 {
    static TOKEN_COUNTER: AtomicU64 = AtomicU64::new(0);
    TOKEN_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Moves elections through their time-driven statuses.
///
/// Every `scheduled` or `live` election has one pending task, due at the
/// next instant its status can change (its start or end time). When a task
/// fires, it re-evaluates the election and schedules the following boundary.
#[derive(Clone)]
pub struct StatusScheduler {
    tasks: Arc<Mutex<TaskMap>>,
    elections: Coll<Election>,
    votes: Coll<Vote>,
    events: ElectionEvents,
}

impl StatusScheduler {
    pub fn new(db: &Database, events: ElectionEvents) -> Self {
        Self {
            tasks: Default::default(),
            elections: Coll::from_db(db),
            votes: Coll::from_db(db),
            events,
        }
    }

    /// Does the given election have a pending evaluation?
    pub async fn is_scheduled(&self, election_id: Id) -> bool {
        self.tasks.lock().await.contains_key(&election_id)
    }

    /// Re-evaluate every `scheduled` and `live` election now, apply any
    /// changes, and (re)schedule each election's next evaluation.
    ///
    /// Running this twice in succession changes nothing the second time.
    pub async fn sweep(&self) -> Result<Vec<StatusChange>> {
        let filter = doc! {
            "status": { "$in": [ElectionStatus::Scheduled, ElectionStatus::Live] },
        };
        let pending: Vec<Election> = self.elections.find(filter, None).await?.try_collect().await?;

        let now = Utc::now();
        let mut changes = Vec::new();
        for mut election in pending {
            if let Some(change) = self.refresh(&election, now).await? {
                election.status = change.to;
                changes.push(change);
            }
            self.schedule(&election).await;
        }
        if !changes.is_empty() {
            info!("Status sweep changed {} elections", changes.len());
        }
        Ok(changes)
    }

    /// Re-evaluate one election's status at `now`, applying any change.
    ///
    /// The update only applies if the status is still the one we read, so a
    /// concurrent launch or revert always wins.
    pub async fn refresh(
        &self,
        election: &Election,
        now: DateTime<Utc>,
    ) -> Result<Option<StatusChange>> {
        let voted = has_votes(&self.votes, election.id).await?;
        let from = election.status;
        let to = from.refreshed(now, election.start_time, election.end_time, voted);
        if from == to {
            return Ok(None);
        }

        let filter = doc! {
            "_id": election.id,
            "status": from,
        };
        // Closing reads the admitted ballots in the same write, so a ballot
        // is either counted here or refused admission afterwards.
        let status = if to.is_closed() {
            bson!({
                "$cond": [
                    { "$or": [voted, { "$gt": ["$ballots_admitted", 0] }] },
                    ElectionStatus::Completed,
                    ElectionStatus::Ended,
                ]
            })
        } else {
            bson!({ "$literal": to })
        };
        let update = vec![doc! {
            "$set": {
                "status": status,
                "updated_at": BsonDateTime::from_chrono(now),
            }
        }];
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let to = match self
            .elections
            .find_one_and_update(filter, update, options)
            .await?
        {
            Some(updated) => updated.status,
            None => {
                debug!("Election {} changed under us, skipping {from} -> {to}", election.id);
                return Ok(None);
            }
        };

        info!("Election {} is now {to} (was {from})", election.id);
        self.events.elections_changed();
        Ok(Some(StatusChange {
            election_id: election.id.to_string(),
            from,
            to,
        }))
    }

    /// Schedule the next evaluation of the given election, replacing any
    /// pending one. Elections with no upcoming boundary are unscheduled.
    pub async fn schedule(&self, election: &Election) {
        let mut tasks = self.tasks.lock().await;
        if let Some(previous) = tasks.remove(&election.id) {
            previous.task.abort();
        }
        if let Some(run_at) = election
            .status
            .next_transition(election.start_time, election.end_time)
        {
            trace!("Evaluating election {} at {run_at}", election.id);
            let token = next_token();
            let task = ScheduledTask::new(self.clone().evaluate(election.id, token), run_at);
            tasks.insert(election.id, Entry { token, task });
        }
    }

    /// Drop any pending evaluation of the given election.
    pub async fn cancel(&self, election_id: Id) {
        if let Some(previous) = self.tasks.lock().await.remove(&election_id) {
            previous.task.abort();
            trace!("Unscheduled election {election_id}");
        }
    }

    /// The body of a scheduled evaluation.
    /// Since this schedules itself again, we must use `BoxFuture` to
    /// avoid an infinitely-recursive state machine.
    fn evaluate(self, election_id: Id, token: u64) -> BoxFuture<'static, ()> {
        async move {
            let now = Utc::now();
            let next_run = match self.evaluate_once(election_id, now).await {
                Ok(next) => next,
                Err(e) => {
                    error!("Status evaluation for election {election_id} failed: {e}");
                    warn!("Failed evaluation will be retried in {RETRY_INTERVAL_SECONDS} seconds");
                    Some(now + Duration::seconds(RETRY_INTERVAL_SECONDS))
                }
            };

            let mut tasks = self.tasks.lock().await;
            if tasks.get(&election_id).map(|entry| entry.token) != Some(token) {
                trace!("Evaluation of election {election_id} was superseded");
                return;
            }
            tasks.remove(&election_id);
            if let Some(run_at) = next_run {
                // Never spin on a boundary that the clock has not quite reached.
                let run_at = run_at.max(Utc::now() + Duration::seconds(1));
                let token = next_token();
                let task = ScheduledTask::new(self.clone().evaluate(election_id, token), run_at);
                tasks.insert(election_id, Entry { token, task });
            }
        }
        .boxed()
    }

    /// Evaluate the election once, returning when it next needs evaluating.
    async fn evaluate_once(
        &self,
        election_id: Id,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let mut election = match self.elections.find_one(election_id.as_doc(), None).await? {
            Some(election) => election,
            None => {
                debug!("Election {election_id} vanished before its evaluation");
                return Ok(None);
            }
        };
        if let Some(change) = self.refresh(&election, now).await? {
            election.status = change.to;
        }
        Ok(election
            .status
            .next_transition(election.start_time, election.end_time))
    }
}

/// A fairing that sweeps and schedules every pending election during Rocket
/// ignition, and places a [`StatusScheduler`] into managed state.
/// This fairing depends on the database and the [`ElectionEvents`] being
/// available in managed state, and so must be attached after the fairing
/// responsible for the database.
pub struct StatusSchedulerFairing;

#[rocket::async_trait]
impl Fairing for StatusSchedulerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Election Status Scheduler",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        info!("Scheduling election status changes...");
        let db = match rocket.state::<Database>() {
            Some(db) => db,
            None => {
                error!("Database was not available when scheduling elections");
                return Err(rocket);
            }
        };
        let events = match rocket.state::<ElectionEvents>() {
            Some(events) => events.clone(),
            None => {
                error!("Event channel was not available when scheduling elections");
                return Err(rocket);
            }
        };
        let scheduler = StatusScheduler::new(db, events);
        if let Err(e) = scheduler.sweep().await {
            error!("Failed to sweep election statuses: {e}");
            return Err(rocket);
        }
        info!("...election status changes scheduled!");

        rocket = rocket.manage(scheduler);
        Ok(rocket)
    }
}
