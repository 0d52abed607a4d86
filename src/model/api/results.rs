use serde::{Deserialize, Serialize};

use crate::model::{
    common::{
        ballot::{tally, Answer},
        election::{ElectionStatus, OptionId, QuestionId},
    },
    db::election::Election,
};

/// Tallied results of an election.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectionResults {
    pub election_id: String,
    pub title: String,
    pub status: ElectionStatus,
    pub total_votes: u64,
    pub eligible_voters: u64,
    /// Fraction of eligible voters who voted, between 0 and 1.
    pub turnout: f64,
    pub questions: Vec<QuestionResults>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionResults {
    pub question_id: QuestionId,
    pub prompt: String,
    pub options: Vec<OptionResults>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionResults {
    pub option_id: OptionId,
    pub label: String,
    pub votes: u64,
}

impl ElectionResults {
    /// Tally the given ballots for an election.
    pub fn new<'a>(election: &Election, ballots: impl IntoIterator<Item = &'a [Answer]>) -> Self {
        let mut total_votes = 0;
        let counts = tally(
            &election.questions,
            ballots.into_iter().inspect(|_| total_votes += 1),
        );

        let questions = election
            .questions
            .iter()
            .map(|question| QuestionResults {
                question_id: question.id,
                prompt: question.prompt.clone(),
                options: question
                    .options
                    .iter()
                    .map(|option| OptionResults {
                        option_id: option.id,
                        label: option.label.clone(),
                        votes: counts
                            .get(&question.id)
                            .and_then(|options| options.get(&option.id))
                            .copied()
                            .unwrap_or(0),
                    })
                    .collect(),
            })
            .collect();

        let eligible_voters = election.voters.len() as u64;
        let turnout = if eligible_voters == 0 {
            0.0
        } else {
            total_votes as f64 / eligible_voters as f64
        };

        Self {
            election_id: election.id.to_string(),
            title: election.title.clone(),
            status: election.status,
            total_votes,
            eligible_voters,
            turnout,
            questions,
        }
    }
}
