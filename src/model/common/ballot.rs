use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::common::election::{OptionId, QuestionId};

/// A single question on the ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub prompt: String,
    /// How many options a voter may select, at least 1.
    pub max_choices: u32,
    pub options: Vec<BallotOption>,
}

impl Question {
    pub fn option(&self, id: OptionId) -> Option<&BallotOption> {
        self.options.iter().find(|option| option.id == id)
    }
}

/// A selectable choice for a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotOption {
    pub id: OptionId,
    pub label: String,
}

/// The options a voter selected for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: QuestionId,
    pub option_ids: Vec<OptionId>,
}

/// Reasons a submitted ballot is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BallotError {
    #[error("Question {0} does not exist")]
    UnknownQuestion(QuestionId),
    #[error("Question {0} was answered more than once")]
    DuplicateQuestion(QuestionId),
    #[error("Question {0} was not answered")]
    Unanswered(QuestionId),
    #[error("Option {1} does not exist for question {0}")]
    UnknownOption(QuestionId, OptionId),
    #[error("Option {1} was chosen more than once for question {0}")]
    DuplicateOption(QuestionId, OptionId),
    #[error("Question {question} allows 1 to {max} choices, but {given} were given")]
    ChoiceCount {
        question: QuestionId,
        max: u32,
        given: usize,
    },
}

/// Check a ballot against the questions of an election.
///
/// Every question must be answered exactly once with between one and
/// `max_choices` distinct, existing options. The answers are returned in
/// question order, with option IDs sorted.
pub fn validate_answers(
    questions: &[Question],
    answers: Vec<Answer>,
) -> Result<Vec<Answer>, BallotError> {
    let mut by_question: HashMap<QuestionId, Answer> = HashMap::new();
    for answer in answers {
        let question = questions
            .iter()
            .find(|q| q.id == answer.question_id)
            .ok_or(BallotError::UnknownQuestion(answer.question_id))?;

        let mut seen = HashSet::new();
        for option_id in &answer.option_ids {
            if question.option(*option_id).is_none() {
                return Err(BallotError::UnknownOption(question.id, *option_id));
            }
            if !seen.insert(*option_id) {
                return Err(BallotError::DuplicateOption(question.id, *option_id));
            }
        }
        let given = answer.option_ids.len();
        if given == 0 || given > question.max_choices as usize {
            return Err(BallotError::ChoiceCount {
                question: question.id,
                max: question.max_choices,
                given,
            });
        }

        if by_question.insert(question.id, answer).is_some() {
            return Err(BallotError::DuplicateQuestion(question.id));
        }
    }

    questions
        .iter()
        .map(|question| {
            let mut answer = by_question
                .remove(&question.id)
                .ok_or(BallotError::Unanswered(question.id))?;
            answer.option_ids.sort_unstable();
            Ok(answer)
        })
        .collect()
}

/// Count the selections of each option across ballots.
///
/// Every option of every question appears in the result, with zero if never
/// chosen. Selections of questions or options that no longer exist are ignored.
pub fn tally<'a>(
    questions: &[Question],
    ballots: impl IntoIterator<Item = &'a [Answer]>,
) -> HashMap<QuestionId, HashMap<OptionId, u64>> {
    let mut counts: HashMap<QuestionId, HashMap<OptionId, u64>> = questions
        .iter()
        .map(|q| (q.id, q.options.iter().map(|o| (o.id, 0)).collect()))
        .collect();
    for ballot in ballots {
        for answer in ballot {
            if let Some(options) = counts.get_mut(&answer.question_id) {
                for option_id in &answer.option_ids {
                    if let Some(count) = options.get_mut(option_id) {
                        *count += 1;
                    }
                }
            }
        }
    }
    counts
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Question {
        /// A single-choice question with options 1 and 2.
        pub fn example1() -> Self {
            Self {
                id: 1,
                prompt: "Who should chair the committee?".to_string(),
                max_choices: 1,
                options: vec![
                    BallotOption {
                        id: 1,
                        label: "Ada Lovelace".to_string(),
                    },
                    BallotOption {
                        id: 2,
                        label: "Grace Hopper".to_string(),
                    },
                ],
            }
        }

        /// A question allowing up to two of three options.
        pub fn example2() -> Self {
            Self {
                id: 2,
                prompt: "Which socials should we run?".to_string(),
                max_choices: 2,
                options: vec![
                    BallotOption {
                        id: 1,
                        label: "Board games".to_string(),
                    },
                    BallotOption {
                        id: 2,
                        label: "Hiking".to_string(),
                    },
                    BallotOption {
                        id: 3,
                        label: "Pub quiz".to_string(),
                    },
                ],
            }
        }
    }

    impl Answer {
        pub fn new(question_id: QuestionId, option_ids: Vec<OptionId>) -> Self {
            Self {
                question_id,
                option_ids,
            }
        }
    }
}
