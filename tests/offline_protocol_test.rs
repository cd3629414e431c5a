//! Offline protocol: dump tasks, run workers, ingest results.

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use common::{Store, ECHO_PROGRAM};
use response_verifier::adapters::sandbox::{MockReply, MockSandbox};
use response_verifier::domain::models::{Response, TestCases, VerificationStatus};
use response_verifier::services::{DispatchOptions, WorkerJob};

/// Echo responses where every third one prints the wrong answer.
async fn mixed_store() -> Store {
    let store = Store::new().await;
    store.problem("p1", TestCases::stdio([("5", "5")])).await;
    for i in 0..9 {
        let code = if i % 3 == 0 { "print('nope')" } else { ECHO_PROGRAM };
        store
            .response(&format!("r{i:02}"), "p1", code, VerificationStatus::Pending)
            .await;
    }
    store
}

async fn mixed_sandbox() -> Arc<MockSandbox> {
    let sandbox = MockSandbox::new();
    sandbox.set_reply_for("print('nope')", MockReply::stdout("nope")).await;
    Arc::new(sandbox)
}

async fn snapshot(store: &Store) -> Vec<(VerificationStatus, u32)> {
    let mut rows = Vec::new();
    for i in 0..9 {
        let Response { status, retry_count, .. } = store.stored(&format!("r{i:02}")).await;
        rows.push((status, retry_count));
    }
    rows
}

#[tokio::test]
async fn test_dump_worker_ingest_matches_online_run() {
    let online = mixed_store().await;
    let ctx = online.context(mixed_sandbox().await);
    ctx.dispatcher(false)
        .run_online(&ctx.selection(None).unwrap(), &DispatchOptions::new(4))
        .await
        .unwrap();

    let offline = mixed_store().await;
    let ctx = offline.context(mixed_sandbox().await);
    let dir = tempfile::tempdir().unwrap();
    let tasks = dir.path().join("tasks.jsonl");

    let dumped = ctx
        .dispatcher(false)
        .dump_tasks(&ctx.selection(None).unwrap(), &tasks, &DispatchOptions::new(1))
        .await
        .unwrap();
    assert_eq!(dumped.tasks_written, 9);
    assert_eq!(offline.count(VerificationStatus::Pending).await, 9);

    let mut results: Vec<PathBuf> = Vec::new();
    for rank in 0..3 {
        let job = WorkerJob {
            tasks: tasks.clone(),
            rank,
            world_size: 3,
            output: None,
        };
        ctx.offline_worker()
            .run(&job, &DispatchOptions::new(2))
            .await
            .unwrap();
        results.push(job.output_path());
    }

    let ingested = ctx
        .dispatcher(false)
        .ingest_results(&results, &DispatchOptions::new(1))
        .await
        .unwrap();
    assert_eq!(ingested.passed, 6);
    assert_eq!(ingested.failed, 3);
    assert_eq!(ingested.applied, 9);

    assert_eq!(snapshot(&online).await, snapshot(&offline).await);
}

#[tokio::test]
async fn test_ingesting_twice_equals_ingesting_once() {
    let store = mixed_store().await;
    let ctx = store.context(mixed_sandbox().await);
    let dir = tempfile::tempdir().unwrap();
    let tasks = dir.path().join("tasks.jsonl");
    let results = dir.path().join("results.jsonl");

    ctx.dispatcher(false)
        .dump_tasks(&ctx.selection(None).unwrap(), &tasks, &DispatchOptions::new(1))
        .await
        .unwrap();
    let job = WorkerJob {
        tasks,
        rank: 0,
        world_size: 1,
        output: Some(results.clone()),
    };
    ctx.offline_worker().run(&job, &DispatchOptions::new(3)).await.unwrap();

    let dispatcher = ctx.dispatcher(false);
    let first = dispatcher
        .ingest_results(&[results.clone()], &DispatchOptions::new(1))
        .await
        .unwrap();
    let after_first = snapshot(&store).await;

    let second = dispatcher
        .ingest_results(&[results], &DispatchOptions::new(1))
        .await
        .unwrap();

    assert_eq!(first.applied, 9);
    assert_eq!(second.applied, 0);
    assert_eq!(second.unchanged, 9);
    assert_eq!(snapshot(&store).await, after_first);
}

#[tokio::test]
async fn test_ingest_skips_malformed_lines_and_unknown_ids() {
    let store = Store::new().await;
    store.echo_batch(2).await;
    let ctx = store.context(Arc::new(MockSandbox::new()));

    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("results.jsonl");
    let content = [
        r#"{"id": "r00", "verification_status": "passed", "verification_details": {"note": "ok"}}"#,
        "{truncated",
        r#"{"id": "ghost", "verification_status": "failed", "verification_details": null}"#,
        r#"{"id": "r01", "verdict": "failed", "verification_details": [], "attempt": 0}"#,
        "",
    ]
    .join("\n");
    tokio::fs::write(&results, content).await.unwrap();

    let summary = ctx
        .dispatcher(false)
        .ingest_results(
            &[results, dir.path().join("missing.jsonl")],
            &DispatchOptions::new(1),
        )
        .await
        .unwrap();

    assert_eq!(summary.malformed, 1);
    assert_eq!(summary.unknown, 1);
    assert_eq!(summary.unreadable_files, 1);
    assert_eq!(summary.applied, 2);
    assert_eq!(store.stored("r00").await.status, VerificationStatus::Passed);
    assert_eq!(store.stored("r01").await.status, VerificationStatus::Failed);
}

#[tokio::test]
async fn test_ingest_continues_past_invalid_utf8_line() {
    let store = Store::new().await;
    store.echo_batch(2).await;
    let ctx = store.context(Arc::new(MockSandbox::new()));

    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("results.jsonl");
    let mut bytes = br#"{"id": "r00", "verification_status": "passed"}"#.to_vec();
    bytes.extend_from_slice(b"\n{\"id\": \"\xff\", \"verification_status\": \"passed\"}\n");
    bytes.extend_from_slice(br#"{"id": "r01", "verification_status": "passed"}"#);
    tokio::fs::write(&results, bytes).await.unwrap();

    let summary = ctx
        .dispatcher(false)
        .ingest_results(&[results], &DispatchOptions::new(1))
        .await
        .unwrap();

    assert_eq!(summary.applied, 2);
    assert_eq!(summary.malformed, 1);
    assert_eq!(summary.unreadable_files, 0);
    assert_eq!(store.stored("r01").await.status, VerificationStatus::Passed);
}

#[tokio::test]
async fn test_bulk_reset_invalidates_previous_dump() {
    let store = Store::new().await;
    store.echo_batch(1).await;
    let ctx = store.context(Arc::new(MockSandbox::new()));
    let dir = tempfile::tempdir().unwrap();
    let tasks = dir.path().join("tasks.jsonl");
    let results = dir.path().join("results.jsonl");

    ctx.dispatcher(false)
        .dump_tasks(&ctx.selection(None).unwrap(), &tasks, &DispatchOptions::new(1))
        .await
        .unwrap();
    let job = WorkerJob {
        tasks,
        rank: 0,
        world_size: 1,
        output: Some(results.clone()),
    };
    ctx.offline_worker().run(&job, &DispatchOptions::new(1)).await.unwrap();

    // Reset to pending after the dump; the old results must not land.
    let report = ctx.ledger().apply(&["r00".to_string()], VerificationStatus::Pending).await;
    assert_eq!(report.updated, 1);

    let summary = ctx
        .dispatcher(false)
        .ingest_results(&[results], &DispatchOptions::new(1))
        .await
        .unwrap();
    assert_eq!(summary.unchanged, 1);
    assert_eq!(store.stored("r00").await.status, VerificationStatus::Pending);
}
