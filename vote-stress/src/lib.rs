//! Vote stress workload: a staged ramp of virtual users, each casting one vote per iteration
//! against the voting API.
pub mod vote;
pub mod workload;

pub use vote::{VoteClient, VoteError, VoteRequest};
pub use workload::{vote_workload, DEFAULT_TARGET};
