//! Status ledger batches against a store that fails on demand.

mod common;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{Store, ECHO_PROGRAM};
use response_verifier::domain::models::{Response, VerificationStatus};
use response_verifier::domain::ports::{
    BatchWrite, CandidateQuery, CandidateRecord, GroupCounts, ResponseFilter, ResponseGrouping, ResponseRepository,
    StatusUpdate,
};
use response_verifier::services::{BulkUpdate, StatusLedger, StoreRetryPolicy};
use response_verifier::{DomainError, DomainResult};

/// Delegates to a real repository; batch writes fail from call `fail_from`
/// on, or only for the first `busy_for` calls with a transient error.
struct FlakyRepository {
    inner: Arc<dyn ResponseRepository>,
    batch_calls: AtomicUsize,
    fail_from: usize,
    busy_for: usize,
}

impl FlakyRepository {
    fn failing_from(inner: Arc<dyn ResponseRepository>, fail_from: usize) -> Self {
        Self {
            inner,
            batch_calls: AtomicUsize::new(0),
            fail_from,
            busy_for: 0,
        }
    }

    fn busy_for(inner: Arc<dyn ResponseRepository>, busy_for: usize) -> Self {
        Self {
            inner,
            batch_calls: AtomicUsize::new(0),
            fail_from: usize::MAX,
            busy_for,
        }
    }
}

#[async_trait]
impl ResponseRepository for FlakyRepository {
    async fn insert(&self, response: &Response) -> DomainResult<()> {
        self.inner.insert(response).await
    }

    async fn get(&self, id: &str) -> DomainResult<Option<Response>> {
        self.inner.get(id).await
    }

    async fn fetch_candidates(&self, query: &CandidateQuery) -> DomainResult<Vec<CandidateRecord>> {
        self.inner.fetch_candidates(query).await
    }

    async fn compare_and_set(&self, update: &StatusUpdate) -> DomainResult<u64> {
        self.inner.compare_and_set(update).await
    }

    async fn ids_matching(&self, filter: &ResponseFilter) -> DomainResult<Vec<String>> {
        self.inner.ids_matching(filter).await
    }

    async fn set_status_batch(&self, ids: &[String], status: VerificationStatus) -> DomainResult<BatchWrite> {
        let call = self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.busy_for {
            return Err(DomainError::DatabaseBusy("database is locked".into()));
        }
        if call >= self.fail_from {
            return Err(DomainError::DatabaseError("disk I/O error".into()));
        }
        self.inner.set_status_batch(ids, status).await
    }

    async fn count_by_status(&self) -> DomainResult<HashMap<VerificationStatus, u64>> {
        self.inner.count_by_status().await
    }

    async fn count_grouped(&self, grouping: ResponseGrouping) -> DomainResult<Vec<GroupCounts>> {
        self.inner.count_grouped(grouping).await
    }
}

async fn seeded(n: usize) -> (Store, Vec<String>) {
    let store = Store::new().await;
    store.echo_batch(0).await;
    let ids: Vec<String> = (0..n).map(|i| format!("r{i:02}")).collect();
    for id in &ids {
        store
            .response(id, "p-echo", ECHO_PROGRAM, VerificationStatus::Failed)
            .await;
    }
    (store, ids)
}

#[tokio::test]
async fn test_failing_chunk_reports_applied_and_unapplied_ids() {
    let (store, ids) = seeded(10).await;
    let flaky = Arc::new(FlakyRepository::failing_from(store.responses.clone(), 2));
    let ledger = StatusLedger::new(flaky)
        .with_chunk_size(4)
        .with_retry_policy(StoreRetryPolicy::none());

    let report = ledger.apply(&ids, VerificationStatus::Pending).await;

    assert_eq!(report.chunks_committed, 2);
    assert_eq!(report.updated, 8);
    let failure = report.failure.clone().unwrap();
    assert_eq!(failure.unapplied, vec!["r08".to_string(), "r09".to_string()]);
    assert!(failure.reason.contains("disk I/O error"));
    assert!(matches!(
        report.check(),
        Err(DomainError::PartialBatch { applied: 8, unapplied: 2, .. })
    ));

    assert_eq!(store.count(VerificationStatus::Pending).await, 8);
    assert_eq!(store.stored("r09").await.status, VerificationStatus::Failed);
}

#[tokio::test]
async fn test_busy_store_is_retried() {
    let (store, ids) = seeded(3).await;
    let flaky = Arc::new(FlakyRepository::busy_for(store.responses.clone(), 2));
    let ledger = StatusLedger::new(flaky).with_retry_policy(StoreRetryPolicy {
        initial_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(5),
        max_elapsed: Duration::from_secs(2),
    });

    let report = ledger.apply(&ids, VerificationStatus::Skipped).await;
    assert!(report.failure.is_none());
    assert_eq!(report.updated, 3);
    assert_eq!(store.count(VerificationStatus::Skipped).await, 3);
}

#[tokio::test]
async fn test_bulk_update_by_current_status() {
    let (store, _) = seeded(4).await;
    store
        .response("p00", "p-echo", ECHO_PROGRAM, VerificationStatus::Passed)
        .await;

    let ledger = StatusLedger::new(store.responses.clone());
    let report = ledger
        .bulk_update(&BulkUpdate {
            filter: ResponseFilter {
                statuses: vec![VerificationStatus::Failed],
                ..ResponseFilter::default()
            },
            target: VerificationStatus::Pending,
            dryrun: false,
        })
        .await
        .unwrap();

    assert_eq!(report.selected, 4);
    assert_eq!(report.updated, 4);
    assert!(report.missing.is_empty());
    assert_eq!(store.count(VerificationStatus::Pending).await, 4);
    assert_eq!(store.stored("p00").await.status, VerificationStatus::Passed);
}
