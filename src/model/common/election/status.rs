use chrono::{DateTime, Utc};
use mongodb::bson::{to_bson, Bson};
use rocket::FromFormField;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// States in the election lifecycle.
///
/// A draft only leaves the draft state through an explicit launch. Every
/// other state is a function of the clock and of whether any vote exists,
/// and any state may be reverted to a draft.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromFormField)]
#[serde(rename_all = "lowercase")]
pub enum ElectionStatus {
    /// Under construction, editable, invisible to voters.
    Draft,
    /// Launched, waiting for the voting window to open.
    Scheduled,
    /// Voting window open.
    Live,
    /// Voting window closed without a single vote.
    Ended,
    /// Voting window closed with at least one vote.
    Completed,
}

/// Reasons a launch can be refused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Election is already {0}")]
    AlreadyLaunched(ElectionStatus),
    #[error("Election voting window has already closed")]
    WindowClosed,
}

impl ElectionStatus {
    /// The status a launched election holds at `now`.
    pub fn for_window(
        now: DateTime<Utc>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        has_votes: bool,
    ) -> Self {
        if now < start_time {
            Self::Scheduled
        } else if now < end_time {
            Self::Live
        } else if has_votes {
            Self::Completed
        } else {
            Self::Ended
        }
    }

    /// Re-evaluate this status against the clock. Drafts are left alone.
    ///
    /// Applying this twice with the same inputs is the same as applying it once.
    pub fn refreshed(
        self,
        now: DateTime<Utc>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        has_votes: bool,
    ) -> Self {
        match self {
            Self::Draft => Self::Draft,
            _ => Self::for_window(now, start_time, end_time, has_votes),
        }
    }

    /// The status resulting from an explicit launch at `now`.
    pub fn launched(
        self,
        now: DateTime<Utc>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Self, TransitionError> {
        match self {
            Self::Draft | Self::Scheduled => {
                if now >= end_time {
                    Err(TransitionError::WindowClosed)
                } else {
                    // No votes can exist before the window opens.
                    Ok(Self::for_window(now, start_time, end_time, false))
                }
            }
            Self::Live | Self::Ended | Self::Completed => {
                Err(TransitionError::AlreadyLaunched(self))
            }
        }
    }

    /// Has voting finished for good?
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Ended | Self::Completed)
    }

    /// Can a ballot be accepted at `now`?
    pub fn accepts_votes(self, now: DateTime<Utc>, end_time: DateTime<Utc>) -> bool {
        self == Self::Live && now < end_time
    }

    /// The next instant at which this status may change on its own, if any.
    pub fn next_transition(
        self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self {
            Self::Scheduled => Some(start_time),
            Self::Live => Some(end_time),
            Self::Draft | Self::Ended | Self::Completed => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Live => "live",
            Self::Ended => "ended",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for ElectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ElectionStatus> for Bson {
    fn from(status: ElectionStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;

    const ALL: [ElectionStatus; 5] = [
        ElectionStatus::Draft,
        ElectionStatus::Scheduled,
        ElectionStatus::Live,
        ElectionStatus::Ended,
        ElectionStatus::Completed,
    ];

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc::now() + Duration::days(1);
        (start, start + Duration::days(7))
    }

    #[test]
    fn status_follows_the_window() {
        let (start, end) = window();
        let before = start - Duration::seconds(1);
        let during = start + Duration::days(1);
        let after = end + Duration::seconds(1);

        use ElectionStatus::*;
        assert_eq!(ElectionStatus::for_window(before, start, end, false), Scheduled);
        assert_eq!(ElectionStatus::for_window(start, start, end, false), Live);
        assert_eq!(ElectionStatus::for_window(during, start, end, true), Live);
        assert_eq!(ElectionStatus::for_window(end, start, end, false), Ended);
        assert_eq!(ElectionStatus::for_window(after, start, end, true), Completed);
    }

    #[test]
    fn closed_elections_reflect_vote_presence() {
        let (start, end) = window();
        let after = end + Duration::hours(1);
        for status in [ElectionStatus::Scheduled, ElectionStatus::Live] {
            assert_eq!(
                status.refreshed(after, start, end, false),
                ElectionStatus::Ended
            );
            assert_eq!(
                status.refreshed(after, start, end, true),
                ElectionStatus::Completed
            );
        }
    }

    #[test]
    fn drafts_never_move_on_their_own() {
        let (start, end) = window();
        for now in [start - Duration::days(1), start, end + Duration::days(1)] {
            for has_votes in [false, true] {
                assert_eq!(
                    ElectionStatus::Draft.refreshed(now, start, end, has_votes),
                    ElectionStatus::Draft
                );
            }
        }
    }

    #[test]
    fn non_drafts_return_to_scheduled_before_start() {
        let (start, end) = window();
        let before = start - Duration::hours(1);
        for status in ALL.into_iter().filter(|s| *s != ElectionStatus::Draft) {
            assert_eq!(
                status.refreshed(before, start, end, false),
                ElectionStatus::Scheduled
            );
        }
    }

    #[test]
    fn refresh_is_idempotent() {
        let (start, end) = window();
        let instants = [
            start - Duration::days(1),
            start,
            start + Duration::days(2),
            end,
            end + Duration::days(2),
        ];
        for status in ALL {
            for now in instants {
                for has_votes in [false, true] {
                    let once = status.refreshed(now, start, end, has_votes);
                    let twice = once.refreshed(now, start, end, has_votes);
                    assert_eq!(once, twice, "{status} at {now} with votes={has_votes}");
                }
            }
        }
    }

    #[test]
    fn launch_before_window_schedules() {
        let (start, end) = window();
        let now = start - Duration::hours(2);
        assert_eq!(
            ElectionStatus::Draft.launched(now, start, end),
            Ok(ElectionStatus::Scheduled)
        );
        assert_eq!(
            ElectionStatus::Scheduled.launched(now, start, end),
            Ok(ElectionStatus::Scheduled)
        );
    }

    #[test]
    fn launch_inside_window_goes_live() {
        let (start, end) = window();
        let now = start + Duration::hours(2);
        assert_eq!(
            ElectionStatus::Draft.launched(now, start, end),
            Ok(ElectionStatus::Live)
        );
        assert_eq!(
            ElectionStatus::Scheduled.launched(now, start, end),
            Ok(ElectionStatus::Live)
        );
    }

    #[test]
    fn launch_rejections() {
        let (start, end) = window();
        assert_eq!(
            ElectionStatus::Draft.launched(end, start, end),
            Err(TransitionError::WindowClosed)
        );
        for status in [
            ElectionStatus::Live,
            ElectionStatus::Ended,
            ElectionStatus::Completed,
        ] {
            assert_eq!(
                status.launched(start, start, end),
                Err(TransitionError::AlreadyLaunched(status))
            );
        }
    }

    #[test]
    fn only_live_elections_accept_votes() {
        let (start, end) = window();
        let during = start + Duration::hours(1);
        for status in ALL {
            assert_eq!(
                status.accepts_votes(during, end),
                status == ElectionStatus::Live
            );
        }
        assert!(!ElectionStatus::Live.accepts_votes(end, end));
    }

    #[test]
    fn next_transition_points() {
        let (start, end) = window();
        assert_eq!(
            ElectionStatus::Scheduled.next_transition(start, end),
            Some(start)
        );
        assert_eq!(ElectionStatus::Live.next_transition(start, end), Some(end));
        assert_eq!(ElectionStatus::Draft.next_transition(start, end), None);
        assert_eq!(ElectionStatus::Ended.next_transition(start, end), None);
        assert_eq!(ElectionStatus::Completed.next_transition(start, end), None);
    }

    #[test]
    fn stored_as_lowercase_string() {
        assert_eq!(
            Bson::from(ElectionStatus::Completed),
            Bson::String("completed".to_string())
        );
        for status in ALL {
            assert_eq!(Bson::from(status), Bson::String(status.to_string()));
        }
    }
}
