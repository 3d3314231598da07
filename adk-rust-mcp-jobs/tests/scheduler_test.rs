//! Scheduler behavior against a real SQLite store with controllable executors.

mod support;

use adk_rust_mcp_jobs::queue::CANCELLED_BY_USER;
use adk_rust_mcp_jobs::{
    CancelOutcome, ExecutorRegistry, Job, JobError, JobQueue, JobStatus, JobStore, JobType, QueueConfig,
};
use proptest::prelude::*;
use serde_json::json;
use std::time::Duration;
use support::{Gated, wait_for_calls, wait_for_status, wait_terminal};

async fn start(store: JobStore, gated: &Gated, config: QueueConfig) -> JobQueue {
    let executors = ExecutorRegistry::new().with(JobType::Generate, gated.clone());
    JobQueue::start(store, executors, config).await.unwrap()
}

async fn start_limited(gated: &Gated, limit: usize) -> JobQueue {
    let store = JobStore::in_memory().await.unwrap();
    start(store, gated, QueueConfig::default().with_max_concurrent_jobs(limit)).await
}

async fn submit(queue: &JobQueue, prompt: &str) -> String {
    queue
        .create_job(JobType::Generate, json!({ "prompt": prompt }))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_limit_admits_exactly_that_many_jobs() {
    let gated = Gated::new();
    let queue = start_limited(&gated, 2).await;

    for prompt in ["a", "b", "c"] {
        submit(&queue, prompt).await;
    }

    // Admission is decided before create_job returns, independent of executors.
    let stats = queue.store().count_by_status().await.unwrap();
    assert_eq!(stats.running, 2);
    assert_eq!(stats.pending, 1);
    assert_eq!(queue.stats().await.unwrap().running, 2);

    gated.release(3);
}

#[tokio::test]
async fn test_freed_slot_dispatches_next_pending_job() {
    let gated = Gated::new();
    let queue = start_limited(&gated, 1).await;

    let a = submit(&queue, "a").await;
    let b = submit(&queue, "b").await;
    assert_eq!(queue.get_job(&b).await.unwrap().unwrap().status, JobStatus::Pending);

    gated.release(1);
    let done = wait_for_status(&queue, &a, JobStatus::Completed).await;
    assert_eq!(done.result.unwrap().outputs, vec![format!("/out/{}.png", a)]);

    wait_for_status(&queue, &b, JobStatus::Running).await;
    gated.release(1);
    wait_for_status(&queue, &b, JobStatus::Completed).await;
}

#[tokio::test]
async fn test_dispatch_follows_creation_order() {
    let gated = Gated::new();
    let queue = start_limited(&gated, 1).await;

    let ids = [
        submit(&queue, "first").await,
        submit(&queue, "second").await,
        submit(&queue, "third").await,
    ];

    for n in 1..=3 {
        wait_for_calls(&gated, n).await;
        gated.release(1);
    }
    for id in &ids {
        wait_terminal(&queue, id).await;
    }

    assert_eq!(gated.seen(), vec!["first", "second", "third"]);

    let jobs: Vec<Job> = fetch_all(&queue, &ids).await;
    assert!(jobs[0].started_at <= jobs[1].started_at);
    assert!(jobs[1].started_at <= jobs[2].started_at);
}

async fn fetch_all(queue: &JobQueue, ids: &[String]) -> Vec<Job> {
    let mut jobs = Vec::new();
    for id in ids {
        jobs.push(queue.get_job(id).await.unwrap().unwrap());
    }
    jobs
}

#[tokio::test]
async fn test_cancel_pending_job_never_invokes_executor() {
    let gated = Gated::new();
    let queue = start_limited(&gated, 1).await;

    let a = submit(&queue, "a").await;
    let b = submit(&queue, "b").await;

    assert_eq!(queue.cancel_job(&b).await.unwrap(), CancelOutcome::Cancelled);

    let cancelled = queue.get_job(&b).await.unwrap().unwrap();
    assert_eq!(cancelled.status, JobStatus::Failed);
    assert_eq!(cancelled.error.as_deref(), Some(CANCELLED_BY_USER));
    assert!(cancelled.completed_at.is_some());

    gated.release(2);
    wait_for_status(&queue, &a, JobStatus::Completed).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(gated.seen(), vec!["a"]);
    assert_eq!(queue.get_job(&b).await.unwrap().unwrap().status, JobStatus::Failed);
}

#[tokio::test]
async fn test_cancelled_running_job_fails_despite_success() {
    let gated = Gated::new();
    let queue = start_limited(&gated, 1).await;

    let id = submit(&queue, "a").await;
    wait_for_calls(&gated, 1).await;

    assert_eq!(
        queue.cancel_job(&id).await.unwrap(),
        CancelOutcome::CancellationRequested
    );
    // Still running until the executor returns.
    assert_eq!(queue.get_job(&id).await.unwrap().unwrap().status, JobStatus::Running);

    gated.release(1);
    let job = wait_terminal(&queue, &id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some(CANCELLED_BY_USER));
    assert!(job.result.is_none());
    assert_eq!(queue.stats().await.unwrap().cancellation_requests, 0);
}

#[tokio::test]
async fn test_cancelled_running_job_frees_its_slot() {
    let gated = Gated::new();
    let queue = start_limited(&gated, 1).await;

    let a = submit(&queue, "a").await;
    let b = submit(&queue, "b").await;
    wait_for_calls(&gated, 1).await;

    queue.cancel_job(&a).await.unwrap();
    gated.release(2);

    wait_terminal(&queue, &a).await;
    let b = wait_terminal(&queue, &b).await;
    assert_eq!(b.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_terminal_jobs_are_final() {
    let gated = Gated::new();
    let store = JobStore::in_memory().await.unwrap();
    let queue = start(store.clone(), &gated, QueueConfig::default()).await;

    let ok = submit(&queue, "ok").await;
    let bad = submit(&queue, "fail me").await;
    gated.release(2);
    let ok_before = wait_terminal(&queue, &ok).await;
    let bad_before = wait_terminal(&queue, &bad).await;

    for id in [&ok, &bad] {
        let err = queue.cancel_job(id).await.unwrap_err();
        assert!(matches!(err, JobError::AlreadyTerminal { .. }));
    }

    // A restart must not disturb finished jobs either.
    queue.shutdown().await;
    let restarted = start(store, &gated, QueueConfig::default()).await;

    assert_eq!(restarted.get_job(&ok).await.unwrap().unwrap(), ok_before);
    assert_eq!(restarted.get_job(&bad).await.unwrap().unwrap(), bad_before);
}

#[tokio::test]
async fn test_result_and_error_are_exclusive() {
    let gated = Gated::new();
    let queue = start_limited(&gated, 3).await;

    let mut ids = Vec::new();
    for prompt in ["one", "fail two", "three", "fail four", "five"] {
        ids.push(submit(&queue, prompt).await);
    }
    queue.cancel_job(&ids[4]).await.unwrap();
    gated.release(5);

    for id in &ids {
        wait_terminal(&queue, id).await;
    }

    for job in queue.list_jobs(None, 100).await.unwrap() {
        match job.status {
            JobStatus::Completed => {
                assert!(job.error.is_none(), "completed job {} has an error", job.id);
                assert!(job.result.is_some(), "completed job {} has no result", job.id);
            }
            JobStatus::Failed => {
                assert!(job.result.is_none(), "failed job {} has a result", job.id);
                assert!(!job.error.unwrap_or_default().is_empty());
            }
            other => panic!("job {} left {}", job.id, other),
        }
    }
}

#[tokio::test]
async fn test_failed_executor_error_is_recorded() {
    let gated = Gated::new();
    let queue = start_limited(&gated, 1).await;

    let id = submit(&queue, "fail loudly").await;
    gated.release(1);
    let job = wait_terminal(&queue, &id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("Imagen rejected prompt 'fail loudly'"));
}

#[tokio::test]
async fn test_interrupted_jobs_resume_after_restart() {
    let store = JobStore::in_memory().await.unwrap();

    // Simulate a previous process that died mid-run: one older pending job and
    // one job stuck in running.
    let older = Job::new(JobType::Generate, json!({ "prompt": "older" }));
    let stuck = Job::new(JobType::Generate, json!({ "prompt": "stuck" }));
    store.create_job(&older).await.unwrap();
    store.create_job(&stuck).await.unwrap();
    let first_start = adk_rust_mcp_jobs::model::now_millis() - chrono::Duration::seconds(30);
    store
        .update_job_status(&stuck.id, JobStatus::Running, Some(first_start), None)
        .await
        .unwrap();

    let gated = Gated::new();
    let queue = start(store, &gated, QueueConfig::default().with_max_concurrent_jobs(1)).await;

    // The single slot goes to the older job; the interrupted one is pending again.
    let resumed = queue.get_job(&stuck.id).await.unwrap().unwrap();
    assert_eq!(resumed.status, JobStatus::Pending);
    assert_eq!(
        queue.get_job(&older.id).await.unwrap().unwrap().status,
        JobStatus::Running
    );

    gated.release(2);
    wait_terminal(&queue, &older.id).await;
    let done = wait_terminal(&queue, &stuck.id).await;

    assert_eq!(done.status, JobStatus::Completed);
    assert!(done.started_at.unwrap() > first_start);
    assert_eq!(gated.seen(), vec!["older", "stuck"]);
}

#[tokio::test]
async fn test_stale_cancellation_requests_are_purged() {
    let gated = Gated::new();
    let store = JobStore::in_memory().await.unwrap();
    let config = QueueConfig::default()
        .with_max_concurrent_jobs(1)
        .with_hygiene(Duration::from_millis(20), Duration::ZERO);
    let queue = start(store.clone(), &gated, config).await;

    let id = submit(&queue, "a").await;
    wait_for_calls(&gated, 1).await;
    queue.cancel_job(&id).await.unwrap();
    assert_eq!(queue.stats().await.unwrap().cancellation_requests, 1);

    // Finished behind the scheduler's back; the request no longer matters.
    store.update_job_error(&id, "Purged by operator").await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(queue.stats().await.unwrap().cancellation_requests, 0);

    // The late executor result does not overwrite the terminal record.
    gated.release(1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let job = queue.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("Purged by operator"));
    assert_eq!(queue.stats().await.unwrap().running, 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// The store never reports more running jobs than the configured limit.
    #[test]
    fn prop_running_never_exceeds_limit(limit in 1usize..4, jobs in 1usize..8) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let gated = Gated::new();
            let queue = start_limited(&gated, limit).await;

            let mut ids = Vec::new();
            for i in 0..jobs {
                ids.push(submit(&queue, &format!("job {}", i)).await);
                let running = queue.store().count_by_status().await.unwrap().running as usize;
                assert!(running <= limit);
            }
            let running = queue.store().count_by_status().await.unwrap().running as usize;
            assert_eq!(running, jobs.min(limit));

            let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
            loop {
                let stats = queue.store().count_by_status().await.unwrap();
                assert!(stats.running as usize <= limit);
                if stats.completed as usize == jobs {
                    break;
                }
                assert!(tokio::time::Instant::now() < deadline, "jobs did not drain");
                gated.release(1);
                tokio::time::sleep(Duration::from_millis(2)).await;
            }

            queue.shutdown().await;
        });
    }
}
