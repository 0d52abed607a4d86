//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs and datetimes are serialised in MongoDB's own format.
//! - Each document type `Foo` comes with a `NewFoo` lacking the `_id`,
//!   for insertion.

pub mod contact;
pub mod election;
pub mod password_reset;
pub mod review;
pub mod user;
pub mod vote;
