//! Failure log: a JSONL record of every result that did not pass or could
//! not be persisted, written alongside a verify run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::reconciler::ReconcileOutcome;
use super::task_file::{JsonlWriter, TaskFileError};
use crate::domain::errors::DomainResult;
use crate::domain::models::{Verdict, VerificationResult};

/// One failure log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub id: String,
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(default)]
    pub details: Value,
    /// Why the result could not be written back, if it could not
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct FailureLog {
    path: PathBuf,
    writer: Mutex<JsonlWriter<FailureRecord>>,
}

impl FailureLog {
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, TaskFileError> {
        let path = path.as_ref();
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(JsonlWriter::create(path).await?),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record `result` when its verdict is failed, error or timeout, or when
    /// reconciling it failed. Passed and skipped results that were persisted
    /// are ignored. A write failure is logged and never fails the run.
    pub async fn record(&self, result: &VerificationResult, outcome: &DomainResult<ReconcileOutcome>) {
        let error = outcome.as_ref().err().map(ToString::to_string);
        let failed_verdict = matches!(result.verdict, Verdict::Failed | Verdict::Error | Verdict::Timeout);
        if !failed_verdict && error.is_none() {
            return;
        }

        let record = FailureRecord {
            id: result.response_id.clone(),
            verdict: result.verdict,
            attempt: result.attempt,
            details: result.details.clone(),
            error,
        };
        if let Err(err) = self.writer.lock().await.write(&record).await {
            tracing::warn!(path = %self.path.display(), response_id = %record.id, error = %err, "failure log write failed");
        }
    }

    /// Flush buffered records. Returns how many were written so far.
    pub async fn flush(&self) -> Result<u64, TaskFileError> {
        let mut writer = self.writer.lock().await;
        writer.flush().await?;
        Ok(writer.written())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::DomainError;
    use crate::domain::models::VerificationStatus;
    use serde_json::json;

    fn result(id: &str, verdict: Verdict) -> VerificationResult {
        VerificationResult {
            response_id: id.into(),
            verdict,
            details: json!({"error": "boom"}),
            attempt: Some(3),
            elapsed_ms: None,
        }
    }

    fn applied() -> DomainResult<ReconcileOutcome> {
        Ok(ReconcileOutcome::Applied {
            from: VerificationStatus::Pending,
            to: VerificationStatus::Failed,
        })
    }

    async fn read_records(path: &Path) -> Vec<FailureRecord> {
        tokio::fs::read_to_string(path)
            .await
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_only_failures_and_persistence_errors_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/failures.jsonl");
        let log = FailureLog::create(&path).await.unwrap();

        log.record(&result("ok", Verdict::Passed), &applied()).await;
        log.record(&result("skip", Verdict::Skipped), &applied()).await;
        log.record(&result("bad", Verdict::Failed), &applied()).await;
        log.record(&result("slow", Verdict::Timeout), &Ok(ReconcileOutcome::Stale))
            .await;
        log.record(
            &result("lost", Verdict::Passed),
            &Err(DomainError::DatabaseError("database is locked".into())),
        )
        .await;

        assert_eq!(log.flush().await.unwrap(), 3);
        let records = read_records(&path).await;
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["bad", "slow", "lost"]);
        assert_eq!(records[0].attempt, Some(3));
        assert_eq!(records[0].error, None);
        assert_eq!(records[1].verdict, Verdict::Timeout);
        assert!(records[2].error.as_deref().unwrap().contains("database is locked"));
    }
}
