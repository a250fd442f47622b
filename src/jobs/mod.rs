//! External asynchronous jobs: the job record and the polling client.

pub mod client;
pub mod job;

pub use client::{CancelFlag, JobClient, JobService, PollBudget};
pub use job::{Job, JobKind, JobStatus, PollReport};
