//! Response repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Response, VerificationStatus};

/// One page of verification candidates.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    /// Statuses eligible for selection
    pub statuses: Vec<VerificationStatus>,
    /// Keyset cursor: only ids strictly greater than this are returned
    pub after_id: Option<String>,
    pub page_size: u32,
    /// Exclude responses whose retry count reached this ceiling
    pub max_retries: Option<u32>,
}

/// A selected response joined with its problem's stored test cases.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    pub response_id: String,
    pub problem_id: String,
    pub code: Option<String>,
    pub attempt: u32,
    /// Raw `test_cases` column; `None` when the problem row is missing
    pub test_cases: Option<String>,
    pub problem_found: bool,
}

/// A guarded write of one verification outcome.
///
/// Applied only if the row still has `expected_status` and, when given,
/// `expected_attempt`. A guarded write with an attempt advances it by one.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub response_id: String,
    pub expected_status: VerificationStatus,
    pub expected_attempt: Option<u32>,
    pub new_status: VerificationStatus,
    pub increment_retry: bool,
    pub details: Value,
}

/// Filter for bulk selection of response ids.
#[derive(Debug, Clone, Default)]
pub struct ResponseFilter {
    /// Restrict to these ids
    pub ids: Option<Vec<String>>,
    /// Restrict to these current statuses (empty = any)
    pub statuses: Vec<VerificationStatus>,
    /// Restrict to problems with these difficulties (empty = any)
    pub difficulties: Vec<String>,
    /// Only responses created at or after this instant
    pub created_after: Option<DateTime<Utc>>,
    /// Only responses created strictly before this instant
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl ResponseFilter {
    /// Whether the filter restricts anything at all.
    pub fn is_unrestricted(&self) -> bool {
        self.ids.is_none() && !self.has_predicates()
    }

    /// Whether anything besides the id list narrows the selection.
    pub fn has_predicates(&self) -> bool {
        !self.statuses.is_empty()
            || !self.difficulties.is_empty()
            || self.created_after.is_some()
            || self.created_before.is_some()
    }
}

/// Dimension for grouped response counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseGrouping {
    Model,
    Source,
    Difficulty,
}

impl ResponseGrouping {
    pub const ALL: [Self; 3] = [Self::Model, Self::Source, Self::Difficulty];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Source => "source",
            Self::Difficulty => "difficulty",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "model" => Some(Self::Model),
            "source" => Some(Self::Source),
            "difficulty" => Some(Self::Difficulty),
            _ => None,
        }
    }
}

/// Response counts for one group value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupCounts {
    /// Group value; `None` for responses without one (or without a problem row)
    pub key: Option<String>,
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub error: u64,
    pub pending: u64,
    /// Distinct problems among the group's responses
    pub problems: u64,
}

/// Outcome of one transactional batch write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchWrite {
    pub updated: u64,
    /// Ids that matched no row
    pub missing: Vec<String>,
}

/// Repository interface for response persistence.
#[async_trait]
pub trait ResponseRepository: Send + Sync {
    /// Insert a new response.
    async fn insert(&self, response: &Response) -> DomainResult<()>;

    /// Get a response by ID.
    async fn get(&self, id: &str) -> DomainResult<Option<Response>>;

    /// Fetch the next page of candidates in ascending id order.
    async fn fetch_candidates(&self, query: &CandidateQuery) -> DomainResult<Vec<CandidateRecord>>;

    /// Apply a guarded update. Returns the number of rows changed (0 or 1).
    async fn compare_and_set(&self, update: &StatusUpdate) -> DomainResult<u64>;

    /// Select response ids matching a filter, in ascending id order.
    async fn ids_matching(&self, filter: &ResponseFilter) -> DomainResult<Vec<String>>;

    /// Set `status` on every id in one transaction.
    async fn set_status_batch(
        &self,
        ids: &[String],
        status: VerificationStatus,
    ) -> DomainResult<BatchWrite>;

    /// Count responses by status.
    async fn count_by_status(&self) -> DomainResult<HashMap<VerificationStatus, u64>>;

    /// Count responses per model, problem source or problem difficulty,
    /// largest group first.
    async fn count_grouped(&self, grouping: ResponseGrouping) -> DomainResult<Vec<GroupCounts>>;
}
