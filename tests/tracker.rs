//! Tracker and poller behavior against a scripted backend, on a paused clock.
//!
//! The poll period is 2s; checkpoints sit half a second after a tick so the
//! ordering of ticks and assertions is unambiguous.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Reply, ScriptedClient, finished, running};
use syncwatch::cli::watch;
use syncwatch::error::ErrorKind;
use syncwatch::jobs::{
    JobConfig, JobId, JobRecord, JobStatus, JobTracker, PollPolicy, PollState, SyncType,
};
use tokio::time::{Instant, sleep_until};

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

async fn at(start: Instant, millis: u64) {
    sleep_until(start + ms(millis)).await;
}

fn assert_completed_at_invariant(tracker: &JobTracker) {
    for job in tracker.snapshot().values() {
        assert_eq!(
            job.record.completed_at.is_some(),
            job.record.status.is_terminal(),
            "completed_at out of step with status for {}",
            job.record.id
        );
    }
}

fn config() -> JobConfig {
    JobConfig::from_filters(SyncType::Incremental, "ENG", "rca")
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn incremental_sync_runs_to_completion_then_stops_polling() {
    let client = Arc::new(ScriptedClient::new());
    client.on_start(Reply::Record(running("abc123", 0, 0)));
    client
        .on_poll("abc123", Reply::Record(running("abc123", 10, 4)))
        .on_poll(
            "abc123",
            Reply::Record(finished("abc123", JobStatus::Completed, 10, 10)),
        );

    let start = Instant::now();
    let mut tracker = JobTracker::new(client.clone(), PollPolicy::default());
    let id = tracker.start_job(config()).await.expect("sync starts");

    assert_eq!(id, JobId::from("abc123"));
    assert_eq!(client.started_configs(), vec![config()]);

    let job = tracker.get(&id).expect("job is tracked");
    assert_eq!(job.record.status, JobStatus::Running);
    assert_eq!(
        (job.record.discovered, job.record.processed, job.record.failed),
        (0, 0, 0)
    );
    assert_eq!(job.record.progress_percent(), 0);
    assert_eq!(job.poll, PollState::Polling);
    assert_eq!(client.poll_count("abc123"), 0);
    assert_completed_at_invariant(&tracker);

    at(start, 2_500).await;
    let job = tracker.get(&id).unwrap();
    assert_eq!(client.poll_count("abc123"), 1);
    assert_eq!(job.record.status, JobStatus::Running);
    assert_eq!(job.record.progress_percent(), 40);
    assert_completed_at_invariant(&tracker);

    at(start, 4_500).await;
    let job = tracker.get(&id).unwrap();
    assert_eq!(client.poll_count("abc123"), 2);
    assert_eq!(job.record.status, JobStatus::Completed);
    assert!(job.record.completed_at.is_some());
    assert_eq!(job.poll, PollState::Finished);
    assert_eq!(tracker.active_count(), 0);
    assert_completed_at_invariant(&tracker);

    at(start, 30_000).await;
    assert_eq!(client.poll_count("abc123"), 2);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn failed_start_tracks_nothing() {
    let client = Arc::new(ScriptedClient::new());
    client
        .on_start(Reply::Rejected("syncType is required".to_string()))
        .on_start(Reply::Unavailable);

    let mut tracker = JobTracker::new(client.clone(), PollPolicy::default());

    let err = tracker.start_job(config()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("syncType is required"));

    let err = tracker.start_job(config()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);

    assert!(tracker.snapshot().is_empty());
    assert_eq!(tracker.active_count(), 0);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(client.total_polls(), 0);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn not_found_freezes_last_good_record() {
    let client = Arc::new(ScriptedClient::new());
    client.on_start(Reply::Record(running("gone", 0, 0)));
    client
        .on_poll("gone", Reply::Record(running("gone", 10, 3)))
        .on_poll("gone", Reply::NotFound);

    let start = Instant::now();
    let mut tracker = JobTracker::new(client.clone(), PollPolicy::default());
    let id = tracker.start_job(config()).await.unwrap();

    at(start, 2_500).await;
    assert_eq!(tracker.get(&id).unwrap().record.processed, 3);

    at(start, 4_500).await;
    let job = tracker.get(&id).expect("record is kept");
    assert_eq!(client.poll_count("gone"), 2);
    assert_eq!(job.record.status, JobStatus::Running);
    assert_eq!(job.record.processed, 3);
    assert!(matches!(job.poll, PollState::Stalled { ref reason } if reason.contains("not found")));

    let handle = tracker.poller(&id).expect("poller handle kept");
    assert!(matches!(handle.finished().await, PollState::Stalled { .. }));

    at(start, 30_000).await;
    assert_eq!(client.poll_count("gone"), 2);
    assert_eq!(tracker.snapshot().len(), 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn transient_failures_retry_with_backoff() {
    let client = Arc::new(ScriptedClient::new());
    client.on_start(Reply::Record(running("flaky", 0, 0)));
    client
        .on_poll("flaky", Reply::Unavailable)
        .on_poll("flaky", Reply::Unavailable)
        .on_poll("flaky", Reply::Record(running("flaky", 10, 5)))
        .on_poll("flaky", Reply::Record(running("flaky", 10, 6)));

    let start = Instant::now();
    let mut tracker = JobTracker::new(client.clone(), PollPolicy::default());
    let id = tracker.start_job(config()).await.unwrap();

    // Tick at 2s fails; first retry after 500ms.
    at(start, 2_200).await;
    assert_eq!(client.poll_count("flaky"), 1);
    assert_eq!(tracker.get(&id).unwrap().poll, PollState::Retrying { attempt: 1 });

    // Retry at 2.5s fails; second retry after 1s succeeds at 3.5s.
    at(start, 3_700).await;
    let job = tracker.get(&id).unwrap();
    assert_eq!(client.poll_count("flaky"), 3);
    assert_eq!(job.poll, PollState::Polling);
    assert_eq!(job.record.processed, 5);

    // Regular cadence resumes one period after the successful poll.
    at(start, 5_300).await;
    assert_eq!(client.poll_count("flaky"), 3);
    at(start, 5_700).await;
    assert_eq!(client.poll_count("flaky"), 4);
    assert_eq!(tracker.get(&id).unwrap().record.processed, 6);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn exhausted_retries_stall_the_job() {
    let client = Arc::new(ScriptedClient::new());
    client.on_start(Reply::Record(running("down", 0, 0)));
    client.on_poll("down", Reply::Unavailable);

    let policy = PollPolicy {
        max_retries: 2,
        ..PollPolicy::default()
    };
    let start = Instant::now();
    let mut tracker = JobTracker::new(client.clone(), policy);
    let id = tracker.start_job(config()).await.unwrap();

    at(start, 4_000).await;
    let job = tracker.get(&id).unwrap();
    assert_eq!(client.poll_count("down"), 3);
    assert!(matches!(job.poll, PollState::Stalled { ref reason } if reason.contains("503")));
    assert_eq!(job.record, running("down", 0, 0));

    at(start, 30_000).await;
    assert_eq!(client.poll_count("down"), 3);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn zero_retries_gives_up_after_one_failure() {
    let client = Arc::new(ScriptedClient::new());
    client.on_start(Reply::Record(running("once", 0, 0)));
    client.on_poll("once", Reply::Unavailable);

    let policy = PollPolicy {
        max_retries: 0,
        ..PollPolicy::default()
    };
    let mut tracker = JobTracker::new(client.clone(), policy);
    let id = tracker.start_job(config()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(client.poll_count("once"), 1);
    assert!(matches!(tracker.get(&id).unwrap().poll, PollState::Stalled { .. }));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn cancelling_one_job_leaves_others_ticking() {
    let client = Arc::new(ScriptedClient::new());
    client
        .on_start(Reply::Record(running("job-a", 0, 0)))
        .on_start(Reply::Record(running("job-b", 0, 0)));
    client
        .on_poll("job-a", Reply::Record(running("job-a", 10, 1)))
        .on_poll("job-b", Reply::Record(running("job-b", 10, 1)));

    let start = Instant::now();
    let mut tracker = JobTracker::new(client.clone(), PollPolicy::default());
    let a = tracker.start_job(config()).await.unwrap();
    let b = tracker.start_job(config()).await.unwrap();

    at(start, 2_500).await;
    assert_eq!(client.poll_count("job-a"), 1);
    assert_eq!(client.poll_count("job-b"), 1);

    assert!(tracker.cancel(&a));
    assert!(tracker.cancel(&a), "cancel is idempotent");

    at(start, 4_500).await;
    assert_eq!(client.poll_count("job-a"), 1);
    assert_eq!(client.poll_count("job-b"), 2);
    assert_eq!(tracker.get(&a).unwrap().poll, PollState::Cancelled);
    assert_eq!(tracker.get(&b).unwrap().poll, PollState::Polling);
    assert_eq!(tracker.active_count(), 1);

    at(start, 6_500).await;
    assert_eq!(client.poll_count("job-b"), 3);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn cancel_discards_in_flight_result() {
    let client = Arc::new(ScriptedClient::new());
    client.on_start(Reply::Record(running("slow", 0, 0)));
    client.on_poll(
        "slow",
        Reply::Slow(Duration::from_secs(5), running("slow", 10, 9)),
    );

    let start = Instant::now();
    let mut tracker = JobTracker::new(client.clone(), PollPolicy::default());
    let id = tracker.start_job(config()).await.unwrap();

    // The first poll is issued at 2s and is still outstanding at 3s.
    at(start, 3_000).await;
    assert_eq!(client.poll_count("slow"), 1);
    tracker.cancel(&id);

    at(start, 20_000).await;
    let job = tracker.get(&id).unwrap();
    assert_eq!(job.record.processed, 0);
    assert_eq!(job.poll, PollState::Cancelled);
    assert_eq!(client.poll_count("slow"), 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn slow_poll_does_not_delay_other_jobs() {
    let client = Arc::new(ScriptedClient::new());
    client
        .on_start(Reply::Record(running("slow", 0, 0)))
        .on_start(Reply::Record(running("fast", 0, 0)));
    client
        .on_poll(
            "slow",
            Reply::Slow(Duration::from_secs(10), running("slow", 10, 1)),
        )
        .on_poll("fast", Reply::Record(running("fast", 10, 1)));

    let start = Instant::now();
    let mut tracker = JobTracker::new(client.clone(), PollPolicy::default());
    tracker.start_job(config()).await.unwrap();
    tracker.start_job(config()).await.unwrap();

    at(start, 6_500).await;
    assert_eq!(client.poll_count("slow"), 1, "no overlapping polls for one job");
    assert_eq!(client.poll_count("fast"), 3);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn teardown_cancels_every_poller() {
    let client = Arc::new(ScriptedClient::new());
    client
        .on_start(Reply::Record(running("job-a", 0, 0)))
        .on_start(Reply::Record(running("job-b", 0, 0)));
    client
        .on_poll("job-a", Reply::Record(running("job-a", 1, 1)))
        .on_poll("job-b", Reply::Record(running("job-b", 1, 1)));

    let start = Instant::now();
    let mut tracker = JobTracker::new(client.clone(), PollPolicy::default());
    tracker.start_job(config()).await.unwrap();
    tracker.start_job(config()).await.unwrap();

    at(start, 1_000).await;
    tracker.teardown();
    tracker.teardown();

    at(start, 20_000).await;
    assert_eq!(client.total_polls(), 0);
    assert_eq!(tracker.active_count(), 0);

    let snapshot = tracker.snapshot();
    assert_eq!(snapshot.len(), 2, "records stay visible after teardown");
    assert!(snapshot.values().all(|job| job.poll == PollState::Cancelled));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn dropping_the_tracker_stops_polling() {
    let client = Arc::new(ScriptedClient::new());
    client
        .on_start(Reply::Record(running("job-a", 0, 0)))
        .on_start(Reply::Record(running("job-b", 0, 0)));
    client
        .on_poll("job-a", Reply::Record(running("job-a", 1, 1)))
        .on_poll("job-b", Reply::Record(running("job-b", 1, 1)));

    let start = Instant::now();
    {
        let mut tracker = JobTracker::new(client.clone(), PollPolicy::default());
        tracker.start_job(config()).await.unwrap();
        tracker.start_job(config()).await.unwrap();

        at(start, 2_500).await;
        assert_eq!(client.total_polls(), 2);
    }

    at(start, 20_000).await;
    assert_eq!(client.total_polls(), 2);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn stale_results_never_lower_progress() {
    let client = Arc::new(ScriptedClient::new());
    client.on_start(Reply::Record(running("abc123", 0, 0)));
    client
        .on_poll("abc123", Reply::Record(running("abc123", 10, 8)))
        .on_poll("abc123", Reply::Record(running("abc123", 10, 4)));

    let start = Instant::now();
    let mut tracker = JobTracker::new(client.clone(), PollPolicy::default());
    let id = tracker.start_job(config()).await.unwrap();

    at(start, 2_500).await;
    assert_eq!(tracker.get(&id).unwrap().record.progress_percent(), 80);

    at(start, 6_500).await;
    assert_eq!(client.poll_count("abc123"), 3);
    let record = tracker.get(&id).unwrap().record;
    assert_eq!(record.processed, 8);
    assert_eq!(record.progress_percent(), 80);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn terminal_result_without_timestamp_gets_one() {
    let terminal = JobRecord {
        status: JobStatus::Failed,
        message: "Confluence unreachable".to_string(),
        ..running("abc123", 10, 2)
    };
    assert!(terminal.completed_at.is_none());

    let client = Arc::new(ScriptedClient::new());
    client.on_start(Reply::Record(running("abc123", 0, 0)));
    client.on_poll("abc123", Reply::Record(terminal));

    let mut tracker = JobTracker::new(client.clone(), PollPolicy::default());
    let id = tracker.start_job(config()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;
    let job = tracker.get(&id).unwrap();
    assert_eq!(job.record.status, JobStatus::Failed);
    assert!(job.record.completed_at.is_some());
    assert_eq!(job.poll, PollState::Finished);
    assert_completed_at_invariant(&tracker);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn every_published_snapshot_keeps_completed_at_invariant() {
    let client = Arc::new(ScriptedClient::new());
    client.on_start(Reply::Record(running("abc123", 0, 0)));
    client
        .on_poll("abc123", Reply::Record(running("abc123", 10, 4)))
        .on_poll("abc123", Reply::Record(running("abc123", 10, 7)))
        .on_poll(
            "abc123",
            Reply::Record(finished("abc123", JobStatus::Completed, 10, 10)),
        );

    let mut tracker = JobTracker::new(client.clone(), PollPolicy::default());
    let mut updates = tracker.subscribe();
    let observer = tokio::spawn(async move {
        let mut seen = Vec::new();
        while updates.changed().await.is_ok() {
            seen.extend(
                updates
                    .borrow_and_update()
                    .values()
                    .map(|job| job.record.clone()),
            );
        }
        seen
    });

    let id = tracker.start_job(config()).await.unwrap();
    let final_state = tracker.poller(&id).unwrap().finished().await;
    assert_eq!(final_state, PollState::Finished);
    drop(tracker);

    let seen = observer.await.unwrap();
    assert!(seen.len() >= 2);
    for record in &seen {
        assert_eq!(record.completed_at.is_some(), record.status.is_terminal());
    }
    assert_eq!(seen.last().unwrap().status, JobStatus::Completed);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn discard_forgets_job_and_stops_polling() {
    let client = Arc::new(ScriptedClient::new());
    client.on_start(Reply::Record(running("abc123", 0, 0)));
    client.on_poll("abc123", Reply::Record(running("abc123", 10, 1)));

    let start = Instant::now();
    let mut tracker = JobTracker::new(client.clone(), PollPolicy::default());
    let id = tracker.start_job(config()).await.unwrap();

    at(start, 1_000).await;
    let removed = tracker.discard(&id).expect("record returned");
    assert_eq!(removed.id, id);
    assert!(tracker.snapshot().is_empty());
    assert!(tracker.discard(&id).is_none());
    assert!(!tracker.cancel(&id));

    at(start, 20_000).await;
    assert_eq!(client.total_polls(), 0);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn reused_id_replaces_previous_poller() {
    let client = Arc::new(ScriptedClient::new());
    client
        .on_start(Reply::Record(running("dup", 0, 0)))
        .on_start(Reply::Record(running("dup", 0, 0)));
    client.on_poll("dup", Reply::Record(running("dup", 10, 2)));

    let start = Instant::now();
    let mut tracker = JobTracker::new(client.clone(), PollPolicy::default());
    tracker.start_job(config()).await.unwrap();
    let id = tracker.start_job(config()).await.unwrap();

    at(start, 2_500).await;
    assert_eq!(client.poll_count("dup"), 1);
    assert_eq!(tracker.snapshot().len(), 1);
    assert_eq!(tracker.active_count(), 1);

    let job = tracker.get(&id).unwrap();
    assert_eq!(job.poll, PollState::Polling);
    assert_eq!(job.record.processed, 2);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn follow_returns_when_job_completes() {
    let client = Arc::new(ScriptedClient::new());
    client.on_start(Reply::Record(running("abc123", 0, 0)));
    client
        .on_poll("abc123", Reply::Record(running("abc123", 10, 4)))
        .on_poll(
            "abc123",
            Reply::Record(finished("abc123", JobStatus::Completed, 10, 10)),
        );

    let start = Instant::now();
    let mut tracker = JobTracker::new(client.clone(), PollPolicy::default());
    let id = tracker.start_job(config()).await.unwrap();

    let job = watch::follow(tracker.subscribe(), &id, Duration::from_secs(10))
        .await
        .expect("job followed to the end");

    assert!(watch::succeeded(&job));
    assert_eq!(job.record.processed, 10);
    assert_eq!(start.elapsed(), Duration::from_secs(4));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn follow_reports_stalled_job() {
    let client = Arc::new(ScriptedClient::new());
    client.on_start(Reply::Record(running("gone", 0, 0)));
    client.on_poll("gone", Reply::NotFound);

    let mut tracker = JobTracker::new(client.clone(), PollPolicy::default());
    let id = tracker.start_job(config()).await.unwrap();

    let job = watch::follow(tracker.subscribe(), &id, Duration::from_secs(10))
        .await
        .unwrap();

    assert!(!watch::succeeded(&job));
    assert!(matches!(job.poll, PollState::Stalled { .. }));
    assert_eq!(job.record.status, JobStatus::Running);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn follow_unknown_job_returns_none() {
    let client = Arc::new(ScriptedClient::new());
    let tracker = JobTracker::new(client, PollPolicy::default());

    let outcome = watch::follow(tracker.subscribe(), &JobId::from("nope"), ms(100)).await;
    assert!(outcome.is_none());
}
