//! Tracking of concurrently running sync jobs.
//!
//! The tracker is the single writer of the job map. Pollers report through a
//! callback the tracker builds for them; everyone else reads snapshots or
//! subscribes to changes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::client::JobStatusClient;
use super::model::{JobConfig, JobId, JobRecord};
use super::scheduler::{PollEvent, PollHandle, PollPolicy, PollScheduler, PollState};
use crate::error::ClientError;

/// A tracked job: the last known record plus the state of its poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedJob {
    pub record: JobRecord,
    pub poll: PollState,
    /// Distinguishes pollers when the backend hands out an id again.
    #[serde(skip)]
    generation: u64,
}

impl TrackedJob {
    /// A job entry not owned by any tracker.
    #[cfg(test)]
    pub(crate) fn detached(record: JobRecord, poll: PollState) -> Self {
        Self {
            record,
            poll,
            generation: 0,
        }
    }
}

/// All tracked jobs, keyed by id.
pub type JobSnapshot = BTreeMap<JobId, TrackedJob>;

/// Starts sync jobs and keeps their state current.
///
/// Every poller is attached under the tracker's cancellation token, so
/// dropping the tracker stops all of them.
pub struct JobTracker {
    client: Arc<dyn JobStatusClient>,
    policy: PollPolicy,
    jobs: Arc<watch::Sender<JobSnapshot>>,
    pollers: HashMap<JobId, PollHandle>,
    next_generation: u64,
    shutdown: CancellationToken,
}

impl JobTracker {
    pub fn new(client: Arc<dyn JobStatusClient>, policy: PollPolicy) -> Self {
        let (jobs, _) = watch::channel(JobSnapshot::new());
        Self {
            client,
            policy,
            jobs: Arc::new(jobs),
            pollers: HashMap::new(),
            next_generation: 0,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Start a sync run and begin polling it.
    ///
    /// Returns as soon as the backend has accepted the run. On error nothing
    /// is tracked.
    pub async fn start_job(&mut self, config: JobConfig) -> Result<JobId, ClientError> {
        let record = self.client.start(&config).await?.normalized(Utc::now());
        let id = record.id.clone();

        info!(
            sync_id = %id,
            sync_type = %config.sync_type,
            spaces = ?config.spaces,
            tags = ?config.tags,
            "Sync started"
        );

        if let Some(previous) = self.pollers.remove(&id) {
            debug!(sync_id = %id, "Replacing existing poller");
            previous.cancel();
        }

        let poll = if record.status.is_terminal() {
            PollState::Finished
        } else {
            PollState::Polling
        };
        let already_done = poll.is_done();
        let generation = self.next_generation;
        self.next_generation += 1;

        self.jobs.send_modify(|jobs| {
            jobs.insert(
                id.clone(),
                TrackedJob {
                    record,
                    poll,
                    generation,
                },
            );
        });

        if !already_done {
            let handle = PollScheduler::attach(
                id.clone(),
                Arc::clone(&self.client),
                self.policy,
                self.shutdown.child_token(),
                update_sink(Arc::clone(&self.jobs), id.clone(), generation),
            );
            self.pollers.insert(id.clone(), handle);
        }

        Ok(id)
    }

    /// Current state of every tracked job.
    pub fn snapshot(&self) -> JobSnapshot {
        self.jobs.borrow().clone()
    }

    /// Current record of every tracked job, without poller state.
    pub fn records(&self) -> BTreeMap<JobId, JobRecord> {
        self.jobs
            .borrow()
            .iter()
            .map(|(id, job)| (id.clone(), job.record.clone()))
            .collect()
    }

    pub fn get(&self, id: &JobId) -> Option<TrackedJob> {
        self.jobs.borrow().get(id).cloned()
    }

    /// Receiver that is notified whenever any tracked job changes.
    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.jobs.subscribe()
    }

    /// Number of jobs still being polled.
    pub fn active_count(&self) -> usize {
        self.pollers.values().filter(|h| !h.is_done()).count()
    }

    pub fn poller(&self, id: &JobId) -> Option<&PollHandle> {
        self.pollers.get(id)
    }

    /// Stop polling one job. Its record stays tracked. Returns false if the
    /// job has no poller.
    pub fn cancel(&mut self, id: &JobId) -> bool {
        match self.pollers.get(id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Stop polling one job and forget it.
    pub fn discard(&mut self, id: &JobId) -> Option<JobRecord> {
        if let Some(handle) = self.pollers.remove(id) {
            handle.cancel();
        }

        let mut removed = None;
        self.jobs.send_if_modified(|jobs| {
            removed = jobs.remove(id).map(|job| job.record);
            removed.is_some()
        });

        if removed.is_some() {
            info!(sync_id = %id, "Sync discarded");
        }
        removed
    }

    /// Cancel every poller. Records stay visible; the tracker can still start
    /// new jobs afterwards.
    pub fn teardown(&mut self) {
        let active = self.active_count();
        for handle in self.pollers.values() {
            handle.cancel();
        }
        if active > 0 {
            info!(active, "Tracker torn down, pollers cancelled");
        }
    }
}

impl Drop for JobTracker {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Callback through which a poller writes its own entry.
fn update_sink(
    jobs: Arc<watch::Sender<JobSnapshot>>,
    id: JobId,
    generation: u64,
) -> impl Fn(PollEvent) + Send + Sync + 'static {
    move |event| apply_event(&jobs, &id, generation, event)
}

fn apply_event(jobs: &watch::Sender<JobSnapshot>, id: &JobId, generation: u64, event: PollEvent) {
    jobs.send_if_modified(|jobs| {
        // Discarded or replaced jobs may still have a result in flight.
        let Some(job) = jobs.get_mut(id).filter(|job| job.generation == generation) else {
            return false;
        };

        match event {
            PollEvent::Snapshot(record) => {
                let record = record.normalized(Utc::now());
                job.record = job.record.merged_with(record);
            }
            PollEvent::State(poll) => job.poll = poll,
        }
        true
    });
}
