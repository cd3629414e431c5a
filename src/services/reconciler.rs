//! Result reconciler: applies verification results to stored responses.

use std::sync::Arc;

use super::store_retry::StoreRetryPolicy;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{next_status, RunSummary, Transition, VerificationResult, VerificationStatus};
use crate::domain::ports::{ResponseRepository, StatusUpdate};

/// What reconciling one result did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied {
        from: VerificationStatus,
        to: VerificationStatus,
    },
    /// Would have been applied; persistence is suppressed
    DryRun {
        from: VerificationStatus,
        to: VerificationStatus,
    },
    /// The response is `passed`; results no longer affect it
    Terminal,
    /// The result is for an attempt that was already applied or superseded
    Stale,
}

pub struct ResultReconciler {
    responses: Arc<dyn ResponseRepository>,
    retry: StoreRetryPolicy,
    dryrun: bool,
}

impl ResultReconciler {
    pub fn new(responses: Arc<dyn ResponseRepository>) -> Self {
        Self {
            responses,
            retry: StoreRetryPolicy::default(),
            dryrun: false,
        }
    }

    pub fn with_retry_policy(mut self, retry: StoreRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_dryrun(mut self, dryrun: bool) -> Self {
        self.dryrun = dryrun;
        self
    }

    pub fn is_dryrun(&self) -> bool {
        self.dryrun
    }

    /// Apply one result. Idempotent: delivering the same result again is a
    /// `Stale` no-op for results carrying an attempt number, and rewrites the
    /// same values for results without one.
    ///
    /// Fails with `ResponseNotFound` for an unknown id and with a database
    /// error when the write could not be committed.
    pub async fn reconcile(&self, result: &VerificationResult) -> DomainResult<ReconcileOutcome> {
        let id = result.response_id.as_str();
        let response = self
            .retry
            .run(|| self.responses.get(id))
            .await?
            .ok_or_else(|| DomainError::ResponseNotFound(id.to_string()))?;

        let (status, increment_retry) = match next_status(response.status, result.verdict) {
            Transition::Terminal => return Ok(ReconcileOutcome::Terminal),
            Transition::Advance { status, increment_retry } => (status, increment_retry),
        };

        if result.attempt.is_some_and(|attempt| attempt != response.attempt) {
            tracing::debug!(
                response_id = id,
                result_attempt = ?result.attempt,
                stored_attempt = response.attempt,
                "stale result"
            );
            return Ok(ReconcileOutcome::Stale);
        }

        if self.dryrun {
            return Ok(ReconcileOutcome::DryRun {
                from: response.status,
                to: status,
            });
        }

        let update = StatusUpdate {
            response_id: id.to_string(),
            expected_status: response.status,
            expected_attempt: result.attempt,
            new_status: status,
            increment_retry: increment_retry && result.attempt.is_some(),
            details: result.details.clone(),
        };
        let rows = self.retry.run(|| self.responses.compare_and_set(&update)).await?;

        if rows == 0 {
            // Another writer moved the row between the read and the write.
            return Ok(ReconcileOutcome::Stale);
        }

        tracing::debug!(response_id = id, from = %response.status, to = %status, "result applied");
        Ok(ReconcileOutcome::Applied {
            from: response.status,
            to: status,
        })
    }
}

/// Count one reconciled result into `summary`.
pub fn tally(summary: &mut RunSummary, result: &VerificationResult, outcome: &DomainResult<ReconcileOutcome>) {
    summary.record_verdict(result.verdict);
    match outcome {
        Ok(ReconcileOutcome::Applied { .. } | ReconcileOutcome::DryRun { .. }) => summary.applied += 1,
        Ok(ReconcileOutcome::Terminal | ReconcileOutcome::Stale) => summary.unchanged += 1,
        Err(DomainError::ResponseNotFound(id)) => {
            tracing::warn!(response_id = %id, "result for unknown response");
            summary.unknown += 1;
        }
        Err(err) => {
            tracing::error!(response_id = %result.response_id, error = %err, "failed to persist result");
            summary.persistence_errors += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteResponseRepository};
    use crate::domain::models::{Response, Verdict};
    use serde_json::json;

    async fn setup() -> Arc<SqliteResponseRepository> {
        let pool = create_migrated_test_pool().await.unwrap();
        Arc::new(SqliteResponseRepository::new(pool))
    }

    fn result(id: &str, verdict: Verdict, attempt: Option<u32>) -> VerificationResult {
        VerificationResult {
            response_id: id.into(),
            verdict,
            details: json!({"note": verdict.as_str()}),
            attempt,
            elapsed_ms: None,
        }
    }

    #[tokio::test]
    async fn test_pending_to_failed_then_duplicate_is_stale() {
        let repo = setup().await;
        repo.insert(&Response::new("r1", "p")).await.unwrap();
        let reconciler = ResultReconciler::new(repo.clone());

        let res = result("r1", Verdict::Failed, Some(0));
        assert_eq!(
            reconciler.reconcile(&res).await.unwrap(),
            ReconcileOutcome::Applied {
                from: VerificationStatus::Pending,
                to: VerificationStatus::Failed
            }
        );
        assert_eq!(reconciler.reconcile(&res).await.unwrap(), ReconcileOutcome::Stale);

        let stored = repo.get("r1").await.unwrap().unwrap();
        assert_eq!(stored.status, VerificationStatus::Failed);
        assert_eq!(stored.retry_count, 0);
        assert_eq!(stored.attempt, 1);
    }

    #[tokio::test]
    async fn test_retry_failure_increments_retry_count() {
        let repo = setup().await;
        repo.insert(&Response::new("r1", "p").with_status(VerificationStatus::Error))
            .await
            .unwrap();
        let reconciler = ResultReconciler::new(repo.clone());

        reconciler
            .reconcile(&result("r1", Verdict::Timeout, Some(0)))
            .await
            .unwrap();
        let stored = repo.get("r1").await.unwrap().unwrap();
        assert_eq!(stored.status, VerificationStatus::Error);
        assert_eq!(stored.retry_count, 1);

        reconciler
            .reconcile(&result("r1", Verdict::Passed, Some(1)))
            .await
            .unwrap();
        let stored = repo.get("r1").await.unwrap().unwrap();
        assert_eq!(stored.status, VerificationStatus::Passed);
        assert_eq!(stored.retry_count, 1);
    }

    #[tokio::test]
    async fn test_passed_is_terminal() {
        let repo = setup().await;
        repo.insert(&Response::new("r1", "p").with_status(VerificationStatus::Passed))
            .await
            .unwrap();
        let reconciler = ResultReconciler::new(repo.clone());

        let outcome = reconciler
            .reconcile(&result("r1", Verdict::Failed, None))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Terminal);
        assert_eq!(
            repo.get("r1").await.unwrap().unwrap().status,
            VerificationStatus::Passed
        );
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let repo = setup().await;
        let reconciler = ResultReconciler::new(repo);

        let res = result("ghost", Verdict::Passed, None);
        let outcome = reconciler.reconcile(&res).await;
        assert!(matches!(outcome, Err(DomainError::ResponseNotFound(_))));

        let mut summary = RunSummary::default();
        tally(&mut summary, &res, &outcome);
        assert_eq!(summary.unknown, 1);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.persistence_errors, 0);
    }

    #[tokio::test]
    async fn test_dryrun_does_not_write() {
        let repo = setup().await;
        repo.insert(&Response::new("r1", "p")).await.unwrap();
        let reconciler = ResultReconciler::new(repo.clone()).with_dryrun(true);

        let outcome = reconciler
            .reconcile(&result("r1", Verdict::Passed, Some(0)))
            .await
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::DryRun { .. }));
        assert_eq!(
            repo.get("r1").await.unwrap().unwrap().status,
            VerificationStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_result_without_attempt_is_idempotent_overwrite() {
        let repo = setup().await;
        repo.insert(&Response::new("r1", "p").with_status(VerificationStatus::Failed))
            .await
            .unwrap();
        let reconciler = ResultReconciler::new(repo.clone());

        let res = result("r1", Verdict::Failed, None);
        reconciler.reconcile(&res).await.unwrap();
        reconciler.reconcile(&res).await.unwrap();

        let stored = repo.get("r1").await.unwrap().unwrap();
        assert_eq!(stored.status, VerificationStatus::Failed);
        assert_eq!(stored.retry_count, 0);
        assert_eq!(stored.attempt, 0);
        assert_eq!(stored.details, Some(json!({"note": "failed"})));
    }
}
