pub mod access_key;
pub mod ballot;
pub mod election;
pub mod email;
