//! Ingestion job tracking.
//!
//! - `model`: job records, configs and the backend wire shapes
//! - `client`: the backend operations (start, poll) and their HTTP implementation
//! - `scheduler`: one recurring poller per job
//! - `tracker`: owns the job map and the pollers that update it

pub mod client;
pub mod model;
pub mod scheduler;
pub mod tracker;

pub use client::{HttpJobClient, JobStatusClient};
pub use model::{JobConfig, JobId, JobRecord, JobStatus, SyncResponse, SyncType, split_filters};
pub use scheduler::{PollEvent, PollHandle, PollPolicy, PollScheduler, PollState};
pub use tracker::{JobSnapshot, JobTracker, TrackedJob};
