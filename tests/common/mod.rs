//! Scripted in-memory backend for tracker and scheduler tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use syncwatch::error::ClientError;
use syncwatch::jobs::{JobConfig, JobId, JobRecord, JobStatus, JobStatusClient};

/// One scripted backend answer.
#[derive(Debug, Clone)]
pub enum Reply {
    Record(JobRecord),
    /// Answer with `record` after `delay`.
    Slow(Duration, JobRecord),
    NotFound,
    Unavailable,
    Rejected(String),
}

/// A backend whose answers are queued up front.
///
/// The last queued poll reply for a job repeats once the queue is drained,
/// so a job can be left "running" indefinitely.
#[derive(Default)]
pub struct ScriptedClient {
    starts: Mutex<VecDeque<Reply>>,
    polls: Mutex<HashMap<JobId, VecDeque<Reply>>>,
    poll_counts: Mutex<HashMap<JobId, usize>>,
    started: Mutex<Vec<JobConfig>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(&self, reply: Reply) -> &Self {
        self.starts.lock().unwrap().push_back(reply);
        self
    }

    pub fn on_poll(&self, id: &str, reply: Reply) -> &Self {
        self.polls
            .lock()
            .unwrap()
            .entry(JobId::from(id))
            .or_default()
            .push_back(reply);
        self
    }

    pub fn poll_count(&self, id: &str) -> usize {
        self.poll_counts
            .lock()
            .unwrap()
            .get(&JobId::from(id))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_polls(&self) -> usize {
        self.poll_counts.lock().unwrap().values().sum()
    }

    pub fn started_configs(&self) -> Vec<JobConfig> {
        self.started.lock().unwrap().clone()
    }

    fn next_poll(&self, id: &JobId) -> Option<Reply> {
        let mut polls = self.polls.lock().unwrap();
        let queue = polls.get_mut(id)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

async fn answer(reply: Reply, id: &JobId) -> Result<JobRecord, ClientError> {
    match reply {
        Reply::Record(record) => Ok(record),
        Reply::Slow(delay, record) => {
            tokio::time::sleep(delay).await;
            Ok(record)
        }
        Reply::NotFound => Err(ClientError::NotFound(id.clone())),
        Reply::Unavailable => Err(ClientError::Status {
            status: 503,
            message: "Service Unavailable".to_string(),
        }),
        Reply::Rejected(message) => Err(ClientError::Validation(message)),
    }
}

#[async_trait]
impl JobStatusClient for ScriptedClient {
    async fn start(&self, config: &JobConfig) -> Result<JobRecord, ClientError> {
        self.started.lock().unwrap().push(config.clone());
        let reply = self
            .starts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Unavailable);
        answer(reply, &JobId::from("unstarted")).await
    }

    async fn poll(&self, id: &JobId) -> Result<JobRecord, ClientError> {
        *self
            .poll_counts
            .lock()
            .unwrap()
            .entry(id.clone())
            .or_default() += 1;
        let reply = self.next_poll(id).unwrap_or(Reply::NotFound);
        answer(reply, id).await
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

pub fn running(id: &str, discovered: u64, processed: u64) -> JobRecord {
    JobRecord {
        discovered,
        processed,
        ..JobRecord::started(JobId::from(id), t0())
    }
}

pub fn finished(id: &str, status: JobStatus, discovered: u64, processed: u64) -> JobRecord {
    JobRecord {
        status,
        completed_at: Some(t0() + chrono::Duration::minutes(5)),
        ..running(id, discovered, processed)
    }
}
