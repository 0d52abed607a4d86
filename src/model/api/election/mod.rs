mod desc;
mod spec;

pub use desc::{
    AccessKeyDescription, ElectionDescription, ElectionSummary, InviteReport, VoterDescription,
};
pub use spec::{merge_voters, ElectionSpec, QuestionSpec, SpecError, VoterSpec};
