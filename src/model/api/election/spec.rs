use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    common::{
        ballot::{BallotOption, Question},
        election::{ElectionStatus, OptionId, QuestionId},
        email::{Email, InvalidEmail},
    },
    db::election::{NewElection, Voter},
    mongodb::Id,
};

/// Reasons an election specification is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("Election title must not be empty")]
    EmptyTitle,
    #[error("Election must start before it ends")]
    EmptyWindow,
    #[error("Question {0} has no prompt")]
    EmptyPrompt(QuestionId),
    #[error("Question {0} needs at least two options")]
    TooFewOptions(QuestionId),
    #[error("Question {0} has an empty option")]
    EmptyOption(QuestionId),
    #[error("Question {0} repeats the option '{1}'")]
    DuplicateOption(QuestionId, String),
    #[error("Question {question} allows {max} choices but has only {options} options")]
    MaxChoices {
        question: QuestionId,
        max: u32,
        options: usize,
    },
    #[error(transparent)]
    InvalidEmail(#[from] InvalidEmail),
}

/// An election specification, as submitted to create or update an election.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionSpec {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub questions: Vec<QuestionSpec>,
    /// Voters to register along with the election.
    #[serde(default)]
    pub voters: Vec<VoterSpec>,
}

impl ElectionSpec {
    /// Check the title and voting window.
    pub fn validate_metadata(&self) -> Result<(), SpecError> {
        if self.title.trim().is_empty() {
            return Err(SpecError::EmptyTitle);
        }
        if self.start_time >= self.end_time {
            return Err(SpecError::EmptyWindow);
        }
        Ok(())
    }

    /// Validate the questions and assign their IDs.
    pub fn to_questions(&self) -> Result<Vec<Question>, SpecError> {
        self.questions
            .iter()
            .enumerate()
            .map(|(i, spec)| spec.to_question(1 + i as QuestionId))
            .collect()
    }

    /// Parse the voters, keeping the first of any duplicate e-mails.
    pub fn to_voters(&self) -> Result<Vec<Voter>, SpecError> {
        let mut voters = Vec::new();
        merge_voters(&mut voters, &self.voters)?;
        Ok(voters)
    }

    /// Convert this spec into a new draft election owned by `owner_id`.
    pub fn into_election(self, owner_id: Id) -> Result<NewElection, SpecError> {
        self.validate_metadata()?;
        let questions = self.to_questions()?;
        let voters = self.to_voters()?;
        let now = Utc::now();
        Ok(NewElection {
            owner_id,
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            status: ElectionStatus::Draft,
            start_time: self.start_time,
            end_time: self.end_time,
            questions,
            voters,
            ballots_admitted: 0,
            created_at: now,
            updated_at: now,
        })
    }
}

/// A question specification. Option IDs are assigned in order from 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub prompt: String,
    /// Defaults to 1.
    #[serde(default)]
    pub max_choices: Option<u32>,
    pub options: Vec<String>,
}

impl QuestionSpec {
    pub fn to_question(&self, id: QuestionId) -> Result<Question, SpecError> {
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(SpecError::EmptyPrompt(id));
        }
        if self.options.len() < 2 {
            return Err(SpecError::TooFewOptions(id));
        }

        let mut seen = HashSet::new();
        let mut options = Vec::with_capacity(self.options.len());
        for (i, label) in self.options.iter().enumerate() {
            let label = label.trim();
            if label.is_empty() {
                return Err(SpecError::EmptyOption(id));
            }
            if !seen.insert(label.to_lowercase()) {
                return Err(SpecError::DuplicateOption(id, label.to_string()));
            }
            options.push(BallotOption {
                id: 1 + i as OptionId,
                label: label.to_string(),
            });
        }

        let max_choices = self.max_choices.unwrap_or(1);
        if max_choices == 0 || max_choices as usize > options.len() {
            return Err(SpecError::MaxChoices {
                question: id,
                max: max_choices,
                options: options.len(),
            });
        }

        Ok(Question {
            id,
            prompt: prompt.to_string(),
            max_choices,
            options,
        })
    }
}

/// A voter to register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoterSpec {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Append the given voters to `voters`, skipping e-mails already present.
/// Returns how many were added.
pub fn merge_voters(voters: &mut Vec<Voter>, specs: &[VoterSpec]) -> Result<usize, SpecError> {
    let mut added = 0;
    for spec in specs {
        let email: Email = spec.email.parse()?;
        if voters.iter().any(|voter| voter.email == email) {
            continue;
        }
        let name = spec
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        voters.push(Voter::new(email, name));
        added += 1;
    }
    Ok(added)
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    use chrono::Duration;

    impl ElectionSpec {
        /// An election opening tomorrow.
        pub fn future_example() -> Self {
            let start_time = Utc::now() + Duration::days(1);
            Self {
                title: "Student Council".to_string(),
                description: "Choose next year's council".to_string(),
                start_time,
                end_time: start_time + Duration::days(7),
                questions: vec![QuestionSpec::example1(), QuestionSpec::example2()],
                voters: vec![VoterSpec::example1(), VoterSpec::example2()],
            }
        }

        /// An election whose window is open now.
        pub fn current_example() -> Self {
            let start_time = Utc::now() - Duration::hours(1);
            Self {
                start_time,
                end_time: start_time + Duration::days(7),
                ..Self::future_example()
            }
        }

        /// An election whose window has already closed.
        pub fn past_example() -> Self {
            let start_time = Utc::now() - Duration::days(8);
            Self {
                start_time,
                end_time: start_time + Duration::days(7),
                ..Self::future_example()
            }
        }
    }

    impl QuestionSpec {
        pub fn example1() -> Self {
            Self {
                prompt: "Who should be president?".to_string(),
                max_choices: None,
                options: vec!["Ada".to_string(), "Grace".to_string()],
            }
        }

        pub fn example2() -> Self {
            Self {
                prompt: "Which events should we run?".to_string(),
                max_choices: Some(2),
                options: vec![
                    "Hackathon".to_string(),
                    "Quiz night".to_string(),
                    "Film club".to_string(),
                ],
            }
        }
    }

    impl VoterSpec {
        pub fn example1() -> Self {
            Self {
                email: "voter.one@example.com".to_string(),
                name: Some("Voter One".to_string()),
            }
        }

        pub fn example2() -> Self {
            Self {
                email: "Voter.Two@Example.com".to_string(),
                name: None,
            }
        }
    }
}
