//! Status ledger: bulk reads and chunked, transactional status writes.

use serde::Serialize;
use std::sync::Arc;

use super::store_retry::StoreRetryPolicy;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::VerificationStatus;
use crate::domain::ports::{GroupCounts, ResponseFilter, ResponseGrouping, ResponseRepository};

/// Ids written per transaction.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// A bulk status change.
#[derive(Debug, Clone)]
pub struct BulkUpdate {
    pub filter: ResponseFilter,
    pub target: VerificationStatus,
    pub dryrun: bool,
}

/// The chunk that failed and everything after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub reason: String,
    pub unapplied: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchUpdateReport {
    /// Ids selected for the update
    pub selected: usize,
    /// Rows changed
    pub updated: u64,
    /// Requested ids with no stored response
    pub missing: Vec<String>,
    pub chunks_committed: usize,
    pub failure: Option<BatchFailure>,
    pub dryrun: bool,
}

impl BatchUpdateReport {
    /// `PartialBatch` error when a chunk failed.
    pub fn check(&self) -> DomainResult<()> {
        match &self.failure {
            Some(failure) => Err(DomainError::PartialBatch {
                applied: self.updated,
                unapplied: failure.unapplied.len(),
                reason: failure.reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

pub struct StatusLedger {
    responses: Arc<dyn ResponseRepository>,
    retry: StoreRetryPolicy,
    chunk_size: usize,
}

impl StatusLedger {
    pub fn new(responses: Arc<dyn ResponseRepository>) -> Self {
        Self {
            responses,
            retry: StoreRetryPolicy::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_retry_policy(mut self, retry: StoreRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Ids of responses currently in `status`.
    pub async fn ids_with_status(&self, status: VerificationStatus, limit: Option<u32>) -> DomainResult<Vec<String>> {
        let filter = ResponseFilter {
            statuses: vec![status],
            limit,
            ..ResponseFilter::default()
        };
        self.retry.run(|| self.responses.ids_matching(&filter)).await
    }

    /// Set `status` on `ids`, one transaction per chunk. Stops at the first
    /// failing chunk and reports it with every id not yet applied.
    pub async fn apply(&self, ids: &[String], status: VerificationStatus) -> BatchUpdateReport {
        let mut report = BatchUpdateReport {
            selected: ids.len(),
            ..BatchUpdateReport::default()
        };

        for (index, chunk) in ids.chunks(self.chunk_size).enumerate() {
            match self.retry.run(|| self.responses.set_status_batch(chunk, status)).await {
                Ok(write) => {
                    report.updated += write.updated;
                    report.missing.extend(write.missing);
                    report.chunks_committed += 1;
                }
                Err(err) => {
                    let done = index * self.chunk_size;
                    tracing::error!(
                        chunk = index,
                        applied = report.updated,
                        unapplied = ids.len() - done,
                        error = %err,
                        "status batch failed"
                    );
                    report.failure = Some(BatchFailure {
                        reason: err.to_string(),
                        unapplied: ids[done..].to_vec(),
                    });
                    break;
                }
            }
        }

        tracing::info!(
            status = %status,
            updated = report.updated,
            missing = report.missing.len(),
            "status batch finished"
        );
        report
    }

    /// Select by filter and set the target status. Refuses an unrestricted
    /// filter so a typo can never rewrite the whole table.
    pub async fn bulk_update(&self, request: &BulkUpdate) -> DomainResult<BatchUpdateReport> {
        if request.filter.is_unrestricted() {
            return Err(DomainError::ValidationFailed(
                "bulk update needs at least one of: id list, current status, difficulty, creation window".to_string(),
            ));
        }

        let ids = match &request.filter.ids {
            // A bare id list is written as given so unknown ids are reported.
            Some(ids) if !request.filter.has_predicates() && request.filter.limit.is_none() =>
            {
                dedupe(ids)
            }
            _ => {
                self.retry
                    .run(|| self.responses.ids_matching(&request.filter))
                    .await?
            }
        };

        if request.dryrun {
            tracing::info!(selected = ids.len(), target = %request.target, "dry run, no changes written");
            return Ok(BatchUpdateReport {
                selected: ids.len(),
                dryrun: true,
                ..BatchUpdateReport::default()
            });
        }

        Ok(self.apply(&ids, request.target).await)
    }

    /// Response counts for every status, in declaration order.
    pub async fn counts(&self) -> DomainResult<Vec<(VerificationStatus, u64)>> {
        let counts = self.retry.run(|| self.responses.count_by_status()).await?;
        Ok(VerificationStatus::ALL
            .into_iter()
            .map(|status| (status, counts.get(&status).copied().unwrap_or(0)))
            .collect())
    }

    /// Response counts per model, source or difficulty.
    pub async fn breakdown(&self, grouping: ResponseGrouping) -> DomainResult<Vec<GroupCounts>> {
        self.retry.run(|| self.responses.count_grouped(grouping)).await
    }
}

fn dedupe(ids: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.iter().filter(|id| seen.insert(id.as_str())).cloned().collect()
}
