//! Headless following of a single sync job.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::jobs::{JobId, JobSnapshot, JobStatus, PollState, TrackedJob};
use crate::logging::LogThrottle;

/// Follow `id` through tracker updates until its poller stops.
///
/// Progress is logged at most once per `log_interval`; status and poller
/// state changes are always logged. Returns the last seen state, or `None`
/// if the job is not (or no longer) tracked.
pub async fn follow(
    mut updates: watch::Receiver<JobSnapshot>,
    id: &JobId,
    log_interval: Duration,
) -> Option<TrackedJob> {
    let mut throttle = LogThrottle::new(log_interval);
    let mut last: Option<TrackedJob> = None;

    loop {
        let current = updates.borrow_and_update().get(id).cloned();
        let Some(job) = current else {
            return last;
        };

        let changed_state = last.as_ref().is_none_or(|prev| {
            prev.record.status != job.record.status || prev.poll != job.poll
        });
        if changed_state {
            throttle.reset();
        }
        let progressed = last.as_ref().is_none_or(|prev| prev.record != job.record);

        if changed_state || (progressed && throttle.should_log()) {
            log_progress(&job);
        }

        if job.poll.is_done() {
            return Some(job);
        }
        last = Some(job);

        if updates.changed().await.is_err() {
            return last;
        }
    }
}

fn log_progress(job: &TrackedJob) {
    let record = &job.record;
    match &job.poll {
        PollState::Stalled { reason } => warn!(
            sync_id = %record.id,
            status = %record.status,
            processed = record.processed,
            discovered = record.discovered,
            reason = %reason,
            "Sync stalled, showing last known state"
        ),
        PollState::Retrying { attempt } => warn!(
            sync_id = %record.id,
            attempt,
            "Status poll failing, retrying"
        ),
        _ => info!(
            sync_id = %record.id,
            status = %record.status,
            progress = record.progress_percent(),
            discovered = record.discovered,
            processed = record.processed,
            failed = record.failed,
            message = %record.message,
            "Sync progress"
        ),
    }
}

/// Whether a followed job ended well.
pub fn succeeded(job: &TrackedJob) -> bool {
    job.record.status == JobStatus::Completed && job.poll == PollState::Finished
}
