mod status;

pub use status::{ElectionStatus, TransitionError};

/// Question IDs are small integers, assigned in order from 1.
pub type QuestionId = u32;
/// Option IDs are small integers, assigned in order from 1 within their question.
pub type OptionId = u32;
