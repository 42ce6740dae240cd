//! Per-job status polling.
//!
//! Each tracked job gets its own task that polls the backend on a fixed
//! period until the job reaches a terminal status, polling gives up on
//! errors, or the task is cancelled. Tasks never share a timer, so a slow or
//! failing job cannot hold up another job's tick.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::JobStatusClient;
use super::model::{JobId, JobRecord};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_millis(500);
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(8);

/// Timing and retry settings for a poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Time between regular polls. The first poll happens one period after
    /// the poller is attached.
    pub period: Duration,
    /// Consecutive transport failures tolerated before giving up.
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each further attempt.
    pub retry_base: Duration,
    pub retry_max_delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            period: DEFAULT_POLL_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base: DEFAULT_RETRY_BASE,
            retry_max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }
}

impl PollPolicy {
    /// Backoff before retry number `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.retry_base
            .saturating_mul(factor)
            .min(self.retry_max_delay)
    }
}

/// Lifecycle of a poller, as seen by its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PollState {
    /// Ticking normally.
    Polling,
    /// The last `attempt` polls failed; retrying with backoff.
    Retrying { attempt: u32 },
    /// The job reached a terminal status.
    Finished,
    /// Polling gave up on an error. The record is frozen at its last good
    /// snapshot.
    Stalled { reason: String },
    /// Stopped by its owner.
    Cancelled,
}

impl PollState {
    /// No further polls will be issued.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Finished | Self::Stalled { .. } | Self::Cancelled)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Polling => "polling",
            Self::Retrying { .. } => "retrying",
            Self::Finished => "finished",
            Self::Stalled { .. } => "stalled",
            Self::Cancelled => "cancelled",
        }
    }
}

/// What a poller reports to its owner.
#[derive(Debug, Clone)]
pub enum PollEvent {
    Snapshot(JobRecord),
    State(PollState),
}

/// Owner's handle to a running poller.
///
/// Dropping the handle does not stop the poller; call [`PollHandle::cancel`]
/// or cancel the parent token it was attached with.
#[derive(Debug)]
pub struct PollHandle {
    id: JobId,
    token: CancellationToken,
    state: watch::Receiver<PollState>,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Stop polling. Idempotent; safe to call in any state.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn state(&self) -> PollState {
        self.state.borrow().clone()
    }

    pub fn is_done(&self) -> bool {
        self.state.borrow().is_done() || self.task.is_finished()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.clone()
    }

    /// Wait until the poller has stopped and return its final state.
    pub async fn finished(&self) -> PollState {
        let mut rx = self.state.clone();
        let result = rx.wait_for(PollState::is_done).await.map(|s| s.clone());
        // The sender only goes away once the task has exited.
        result.unwrap_or(PollState::Cancelled)
    }
}

/// Recurring poll loop for a single job.
pub struct PollScheduler<F> {
    id: JobId,
    client: Arc<dyn JobStatusClient>,
    policy: PollPolicy,
    token: CancellationToken,
    state: watch::Sender<PollState>,
    on_event: F,
}

impl<F> PollScheduler<F>
where
    F: Fn(PollEvent) + Send + Sync + 'static,
{
    /// Spawn a poller for `id`. Every successful poll result and every
    /// state change is passed to `on_event`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach(
        id: JobId,
        client: Arc<dyn JobStatusClient>,
        policy: PollPolicy,
        token: CancellationToken,
        on_event: F,
    ) -> PollHandle {
        let (state, state_rx) = watch::channel(PollState::Polling);
        let scheduler = Self {
            id: id.clone(),
            client,
            policy,
            token: token.clone(),
            state,
            on_event,
        };

        debug!(sync_id = %id, period_ms = policy.period.as_millis() as u64, "Poller attached");
        let task = tokio::spawn(scheduler.run());

        PollHandle {
            id,
            token,
            state: state_rx,
            task,
        }
    }

    async fn run(self) {
        let mut ticker = time::interval_at(Instant::now() + self.policy.period, self.policy.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut failures: u32 = 0;

        let outcome = loop {
            // After a failed poll the backoff sleep replaces the tick.
            if failures == 0 {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => break PollState::Cancelled,
                    _ = ticker.tick() => {}
                }
            }

            let result = tokio::select! {
                biased;
                _ = self.token.cancelled() => break PollState::Cancelled,
                result = self.client.poll(&self.id) => result,
            };

            if self.token.is_cancelled() {
                break PollState::Cancelled;
            }

            match result {
                Ok(record) => {
                    if failures > 0 {
                        failures = 0;
                        ticker.reset();
                        self.set_state(PollState::Polling);
                    }

                    let status = record.status;
                    debug!(
                        sync_id = %self.id,
                        status = %status,
                        processed = record.processed,
                        discovered = record.discovered,
                        "Poll result"
                    );
                    (self.on_event)(PollEvent::Snapshot(record));

                    if status.is_terminal() {
                        info!(sync_id = %self.id, status = %status, "Sync reached terminal status");
                        break PollState::Finished;
                    }
                }
                Err(e) if e.is_retryable() && failures < self.policy.max_retries => {
                    failures += 1;
                    let delay = self.policy.retry_delay(failures);
                    warn!(
                        sync_id = %self.id,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Poll failed, retrying"
                    );
                    self.set_state(PollState::Retrying { attempt: failures });

                    tokio::select! {
                        biased;
                        _ = self.token.cancelled() => break PollState::Cancelled,
                        _ = time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    warn!(sync_id = %self.id, error = %e, "Polling stopped, keeping last known state");
                    break PollState::Stalled {
                        reason: e.to_string(),
                    };
                }
            }
        };

        debug!(sync_id = %self.id, state = outcome.label(), "Poller stopped");
        self.set_state(outcome);
    }

    fn set_state(&self, state: PollState) {
        self.state.send_replace(state.clone());
        (self.on_event)(PollEvent::State(state));
    }
}
