mod base;
mod scheduler;

pub use base::{Election, ElectionCore, NewElection, Voter};
pub use scheduler::{StatusChange, StatusScheduler, StatusSchedulerFairing};
