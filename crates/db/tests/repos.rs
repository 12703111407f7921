//! Repository-level behavior: atomic batch creation, window-bounded
//! claims, fenced transitions, counter aggregation, and stable pages.

use screener_core::status::{BatchStatus, JobStatus};
use screener_core::submission::{Candidate, SubmitBatch};
use screener_db::models::Job;
use screener_db::repositories::{BatchRepo, JobRepo};
use screener_db::repositories::batch_repo::TerminalKind;
use screener_db::repositories::job_repo::Transition;
use screener_db::Database;

fn submission(name: &str, ids: &[&str], max_concurrent: i64) -> SubmitBatch {
    SubmitBatch {
        name: name.to_string(),
        target: serde_json::json!({"kind": "reference-target"}),
        candidates: ids
            .iter()
            .map(|id| Candidate {
                id: id.to_string(),
                descriptor: serde_json::json!({"candidate": id}),
            })
            .collect(),
        max_concurrent: Some(max_concurrent),
        priority: None,
    }
}

async fn claim(db: &Database, attempt: &str) -> Option<Job> {
    JobRepo::claim_next(db.pool(), attempt).await.unwrap()
}

#[tokio::test]
async fn batch_and_jobs_created_atomically() {
    let db = Database::new_in_memory().await.unwrap();
    let batch = BatchRepo::create_with_jobs(db.pool(), &submission("b", &["a", "b", "c"], 2))
        .await
        .unwrap();

    assert_eq!(batch.total_jobs, 3);
    assert_eq!(batch.status_id, BatchStatus::Pending.id());
    assert_eq!(batch.completed_jobs + batch.failed_jobs + batch.cancelled_jobs, 0);

    let counts = JobRepo::status_counts(db.pool(), batch.id).await.unwrap();
    assert_eq!(counts, vec![(JobStatus::Queued.id(), 3)]);
}

#[tokio::test]
async fn claim_respects_per_batch_window() {
    let db = Database::new_in_memory().await.unwrap();
    let batch = BatchRepo::create_with_jobs(
        db.pool(),
        &submission("windowed", &["c1", "c2", "c3", "c4", "c5"], 2),
    )
    .await
    .unwrap();

    assert!(claim(&db, "attempt-1").await.is_some());
    assert!(claim(&db, "attempt-2").await.is_some());
    // Window of 2 is full: nothing further is admissible.
    assert!(claim(&db, "attempt-3").await.is_none());
    assert_eq!(JobRepo::in_flight_count(db.pool(), batch.id).await.unwrap(), 2);
}

#[tokio::test]
async fn claim_order_is_creation_order_within_a_batch() {
    let db = Database::new_in_memory().await.unwrap();
    BatchRepo::create_with_jobs(db.pool(), &submission("ordered", &["first", "second"], 2))
        .await
        .unwrap();

    let first = claim(&db, "a1").await.unwrap();
    let second = claim(&db, "a2").await.unwrap();
    assert_eq!(first.candidate_id, "first");
    assert_eq!(second.candidate_id, "second");
    assert_eq!(first.attempt_count, 1);
    assert_eq!(first.attempt_id.as_deref(), Some("a1"));
}

#[tokio::test]
async fn higher_priority_batch_claims_first() {
    let db = Database::new_in_memory().await.unwrap();
    let mut low = submission("low", &["l1"], 1);
    low.priority = Some(0);
    let mut high = submission("high", &["h1"], 1);
    high.priority = Some(5);

    BatchRepo::create_with_jobs(db.pool(), &low).await.unwrap();
    BatchRepo::create_with_jobs(db.pool(), &high).await.unwrap();

    let first = claim(&db, "a1").await.unwrap();
    assert_eq!(first.candidate_id, "h1");
}

#[tokio::test]
async fn window_reopens_after_terminal_transition() {
    let db = Database::new_in_memory().await.unwrap();
    BatchRepo::create_with_jobs(db.pool(), &submission("reopen", &["c1", "c2", "c3"], 1))
        .await
        .unwrap();

    let job = claim(&db, "a1").await.unwrap();
    assert!(claim(&db, "a2").await.is_none());

    let applied = JobRepo::complete(
        db.pool(),
        job.id,
        "a1",
        0.9,
        &serde_json::json!({"m": 1}),
        &serde_json::json!({"blob": "x"}),
    )
    .await
    .unwrap();
    assert_eq!(applied, Transition::Applied);

    // One slot freed: exactly one more claim succeeds.
    assert!(claim(&db, "a2").await.is_some());
    assert!(claim(&db, "a3").await.is_none());
}

#[tokio::test]
async fn stale_attempt_callback_is_fenced() {
    let db = Database::new_in_memory().await.unwrap();
    BatchRepo::create_with_jobs(db.pool(), &submission("fence", &["c1"], 1))
        .await
        .unwrap();

    let job = claim(&db, "attempt-1").await.unwrap();

    // The dispatcher abandons attempt-1 and reschedules the job.
    let rescheduled =
        JobRepo::reschedule(db.pool(), job.id, "attempt-1", chrono::Utc::now()).await.unwrap();
    assert_eq!(rescheduled, Transition::Applied);

    let job = claim(&db, "attempt-2").await.unwrap();

    // A late callback from the superseded attempt must change nothing.
    let late = JobRepo::complete(
        db.pool(),
        job.id,
        "attempt-1",
        1.0,
        &serde_json::json!({}),
        &serde_json::json!({}),
    )
    .await
    .unwrap();
    assert_eq!(late, Transition::Fenced);

    let current = JobRepo::find_by_id(db.pool(), job.id).await.unwrap().unwrap();
    assert_eq!(current.status_id, JobStatus::Dispatched.id());
    assert_eq!(current.attempt_id.as_deref(), Some("attempt-2"));
    assert!(current.result.is_none());
}

#[tokio::test]
async fn terminal_state_is_idempotent_under_duplicate_callbacks() {
    let db = Database::new_in_memory().await.unwrap();
    BatchRepo::create_with_jobs(db.pool(), &submission("dup", &["c1"], 1))
        .await
        .unwrap();

    let job = claim(&db, "a1").await.unwrap();
    let first = JobRepo::complete(
        db.pool(),
        job.id,
        "a1",
        0.5,
        &serde_json::json!({"m": 1}),
        &serde_json::json!({}),
    )
    .await
    .unwrap();
    assert_eq!(first, Transition::Applied);

    // Duplicate completion and a contradictory failure both bounce.
    let dup = JobRepo::complete(
        db.pool(),
        job.id,
        "a1",
        0.9,
        &serde_json::json!({"m": 2}),
        &serde_json::json!({}),
    )
    .await
    .unwrap();
    assert_eq!(dup, Transition::Fenced);
    let contradiction = JobRepo::fail(db.pool(), job.id, "a1", "boom").await.unwrap();
    assert_eq!(contradiction, Transition::Fenced);

    let current = JobRepo::find_by_id(db.pool(), job.id).await.unwrap().unwrap();
    assert_eq!(current.status_id, JobStatus::Completed.id());
    assert_eq!(current.score, Some(0.5));
    assert!(current.error.is_none());
}

#[tokio::test]
async fn terminal_flip_and_counter_move_commit_or_roll_back_together() {
    let db = Database::new_in_memory().await.unwrap();
    let batch = BatchRepo::create_with_jobs(db.pool(), &submission("atomic", &["c1"], 1))
        .await
        .unwrap();
    let job = claim(&db, "a1").await.unwrap();

    // Flip the job and move the counter in one transaction, then abort it
    // as a failed counter write would.
    let mut tx = db.pool().begin().await.unwrap();
    let flipped = JobRepo::complete(
        &mut *tx,
        job.id,
        "a1",
        0.8,
        &serde_json::json!({"m": 1}),
        &serde_json::json!({}),
    )
    .await
    .unwrap();
    assert_eq!(flipped, Transition::Applied);
    BatchRepo::record_terminal_in(&mut *tx, batch.id, TerminalKind::Completed)
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    // Nothing committed: the job is still dispatched under its attempt and
    // the batch counters never moved.
    let current = JobRepo::find_by_id(db.pool(), job.id).await.unwrap().unwrap();
    assert_eq!(current.status_id, JobStatus::Dispatched.id());
    assert_eq!(current.attempt_id.as_deref(), Some("a1"));
    let stored = BatchRepo::find_by_id(db.pool(), batch.id).await.unwrap().unwrap();
    assert_eq!(stored.completed_jobs, 0);

    // A retried callback for the same attempt is not fenced and repairs
    // both the job and the batch in one go.
    let retried = JobRepo::complete(
        db.pool(),
        job.id,
        "a1",
        0.8,
        &serde_json::json!({"m": 1}),
        &serde_json::json!({}),
    )
    .await
    .unwrap();
    assert_eq!(retried, Transition::Applied);
    let (counters, status) =
        BatchRepo::record_terminal(db.pool(), batch.id, TerminalKind::Completed)
            .await
            .unwrap();
    assert_eq!(counters.completed_jobs, 1);
    assert_eq!(status, BatchStatus::Completed);
}

#[tokio::test]
async fn completed_job_has_result_and_failed_job_has_error() {
    let db = Database::new_in_memory().await.unwrap();
    BatchRepo::create_with_jobs(db.pool(), &submission("iff", &["ok", "bad"], 2))
        .await
        .unwrap();

    let ok = claim(&db, "a1").await.unwrap();
    let bad = claim(&db, "a2").await.unwrap();
    JobRepo::complete(db.pool(), ok.id, "a1", 0.7, &serde_json::json!({}), &serde_json::json!({}))
        .await
        .unwrap();
    JobRepo::fail(db.pool(), bad.id, "a2", "worker exploded").await.unwrap();

    let ok = JobRepo::find_by_id(db.pool(), ok.id).await.unwrap().unwrap();
    assert!(ok.result.is_some() && ok.score.is_some() && ok.error.is_none());

    let bad = JobRepo::find_by_id(db.pool(), bad.id).await.unwrap().unwrap();
    assert!(bad.error.is_some() && bad.result.is_none() && bad.score.is_none());
}

#[tokio::test]
async fn record_terminal_derives_batch_status() {
    let db = Database::new_in_memory().await.unwrap();
    let batch = BatchRepo::create_with_jobs(db.pool(), &submission("derive", &["a", "b"], 2))
        .await
        .unwrap();

    let (counters, status) =
        BatchRepo::record_terminal(db.pool(), batch.id, TerminalKind::Completed)
            .await
            .unwrap();
    assert_eq!(counters.completed_jobs, 1);
    assert_eq!(status, BatchStatus::Running);

    let (counters, status) =
        BatchRepo::record_terminal(db.pool(), batch.id, TerminalKind::Failed)
            .await
            .unwrap();
    assert_eq!(counters.terminal_jobs(), 2);
    assert_eq!(status, BatchStatus::PartiallyFailed);

    let stored = BatchRepo::find_by_id(db.pool(), batch.id).await.unwrap().unwrap();
    assert_eq!(stored.status_id, BatchStatus::PartiallyFailed.id());
    assert!(stored.completed_at.is_some());
}

#[tokio::test]
async fn cancel_moves_every_non_terminal_job() {
    let db = Database::new_in_memory().await.unwrap();
    let batch = BatchRepo::create_with_jobs(
        db.pool(),
        &submission("cancel", &["a", "b", "c", "d", "e"], 2),
    )
    .await
    .unwrap();

    // One job completes before the cancel arrives.
    let done = claim(&db, "a1").await.unwrap();
    JobRepo::complete(db.pool(), done.id, "a1", 0.1, &serde_json::json!({}), &serde_json::json!({}))
        .await
        .unwrap();
    BatchRepo::record_terminal(db.pool(), batch.id, TerminalKind::Completed)
        .await
        .unwrap();
    let in_flight = claim(&db, "a2").await.unwrap();

    let cancelled = BatchRepo::cancel(db.pool(), batch.id).await.unwrap();
    assert_eq!(cancelled, 4);

    let stored = BatchRepo::find_by_id(db.pool(), batch.id).await.unwrap().unwrap();
    assert_eq!(stored.status_id, BatchStatus::Cancelled.id());
    assert_eq!(stored.completed_jobs, 1);
    assert_eq!(stored.cancelled_jobs, 4);
    // Counter invariant holds: all jobs accounted for.
    assert_eq!(
        stored.completed_jobs + stored.failed_jobs + stored.cancelled_jobs,
        stored.total_jobs,
    );

    // Late callback for the in-flight job is fenced by the terminal state.
    let late = JobRepo::complete(
        db.pool(),
        in_flight.id,
        "a2",
        0.9,
        &serde_json::json!({}),
        &serde_json::json!({}),
    )
    .await
    .unwrap();
    assert_eq!(late, Transition::Fenced);
    let current = JobRepo::find_by_id(db.pool(), in_flight.id).await.unwrap().unwrap();
    assert_eq!(current.status_id, JobStatus::Cancelled.id());

    // Nothing from a cancelled batch is claimable.
    assert!(claim(&db, "a3").await.is_none());
}

#[tokio::test]
async fn results_page_is_stable_and_light_pages_omit_artifacts() {
    let db = Database::new_in_memory().await.unwrap();
    let ids: Vec<String> = (0..7).map(|i| format!("cand-{i}")).collect();
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let batch = BatchRepo::create_with_jobs(db.pool(), &submission("pages", &refs, 7))
        .await
        .unwrap();

    // Complete two jobs out of order.
    let j1 = claim(&db, "a1").await.unwrap();
    let j2 = claim(&db, "a2").await.unwrap();
    JobRepo::complete(db.pool(), j2.id, "a2", 0.9, &serde_json::json!({"m": 2}), &serde_json::json!({"blob": "two"}))
        .await
        .unwrap();
    JobRepo::complete(db.pool(), j1.id, "a1", 0.4, &serde_json::json!({"m": 1}), &serde_json::json!({"blob": "one"}))
        .await
        .unwrap();

    let page1 = JobRepo::results_page(db.pool(), batch.id, 1, 3, false).await.unwrap();
    let page2 = JobRepo::results_page(db.pool(), batch.id, 2, 3, false).await.unwrap();
    assert_eq!(page1.len(), 3);
    assert_eq!(page2.len(), 3);

    // Creation-order pagination, no overlap between pages.
    let order: Vec<&str> = page1.iter().map(|j| j.candidate_id.as_str()).collect();
    assert_eq!(order, vec!["cand-0", "cand-1", "cand-2"]);
    assert!(page1.iter().all(|a| page2.iter().all(|b| a.id != b.id)));

    // Light rows never carry artifacts, even for completed jobs.
    assert!(page1.iter().all(|j| j.artifacts.is_none()));
    assert_eq!(page1[0].score, Some(0.4));

    // Heavy rows are a superset: same jobs, artifacts populated.
    let heavy = JobRepo::results_page(db.pool(), batch.id, 1, 3, true).await.unwrap();
    assert_eq!(heavy[0].id, page1[0].id);
    assert_eq!(heavy[0].artifacts.as_ref().unwrap()["blob"], "one");

    // Identical reads return identical pages while nothing changes.
    let again = JobRepo::results_page(db.pool(), batch.id, 1, 3, false).await.unwrap();
    let a = serde_json::to_string(&page1).unwrap();
    let b = serde_json::to_string(&again).unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn backoff_schedule_gates_reclaim() {
    let db = Database::new_in_memory().await.unwrap();
    BatchRepo::create_with_jobs(db.pool(), &submission("backoff", &["c1"], 1))
        .await
        .unwrap();

    let job = claim(&db, "a1").await.unwrap();
    let far_future = chrono::Utc::now() + chrono::Duration::seconds(3600);
    let applied = JobRepo::reschedule(db.pool(), job.id, "a1", far_future).await.unwrap();
    assert_eq!(applied, Transition::Applied);

    // Not admissible until the backoff elapses.
    assert!(claim(&db, "a2").await.is_none());

    let past = chrono::Utc::now() - chrono::Duration::seconds(1);
    sqlx::query("UPDATE jobs SET next_attempt_at = $1 WHERE id = $2")
        .bind(past)
        .bind(job.id)
        .execute(db.pool())
        .await
        .unwrap();
    let reclaimed = claim(&db, "a2").await.unwrap();
    assert_eq!(reclaimed.id, job.id);
    assert_eq!(reclaimed.attempt_count, 2);
}
