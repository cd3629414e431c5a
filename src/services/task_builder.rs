//! Task builder: turns eligible responses into verification tasks.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{parse_retry_set, TestCases, VerificationStatus, VerificationTask};
use crate::domain::ports::{CandidateQuery, CandidateRecord, ResponseRepository};

/// Which responses a run covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Statuses re-selected in addition to `pending`
    pub retry_statuses: Vec<VerificationStatus>,
    pub limit: Option<u64>,
    /// Eligible responses skipped before the first task
    pub offset: u64,
    /// Retry ceiling; responses at or over it are not selected
    pub max_retries: Option<u32>,
}

impl Selection {
    /// Selection from a retry-status list such as `failed,error` or `all`.
    pub fn parse(retry_statuses: Option<&str>) -> DomainResult<Self> {
        Ok(Self {
            retry_statuses: retry_statuses.map(parse_retry_set).transpose()?.unwrap_or_default(),
            ..Self::default()
        })
    }

    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// `pending` plus the retry set, without duplicates.
    pub fn eligible_statuses(&self) -> Vec<VerificationStatus> {
        let mut statuses = vec![VerificationStatus::Pending];
        for status in &self.retry_statuses {
            if !statuses.contains(status) {
                statuses.push(*status);
            }
        }
        statuses
    }

    fn validate(&self) -> DomainResult<()> {
        if let Some(status) = self.retry_statuses.iter().find(|s| s.is_terminal()) {
            return Err(DomainError::ValidationFailed(format!(
                "status '{status}' is terminal and cannot be part of a retry set"
            )));
        }
        Ok(())
    }
}

pub struct TaskBuilder {
    responses: Arc<dyn ResponseRepository>,
    page_size: u32,
    preamble: Option<String>,
}

impl TaskBuilder {
    pub fn new(responses: Arc<dyn ResponseRepository>, page_size: u32) -> Self {
        Self {
            responses,
            page_size: page_size.max(1),
            preamble: None,
        }
    }

    /// Embed `preamble` in every task, so offline workers run the same program.
    pub fn with_preamble(mut self, preamble: Option<String>) -> Self {
        self.preamble = preamble;
        self
    }

    /// Start a task sequence. Fails before touching the store when the
    /// selection is invalid.
    pub fn build(&self, selection: &Selection) -> DomainResult<TaskStream> {
        selection.validate()?;
        tracing::info!(
            statuses = ?selection.eligible_statuses().iter().map(VerificationStatus::as_str).collect::<Vec<_>>(),
            limit = ?selection.limit,
            offset = selection.offset,
            "selecting responses for verification"
        );

        Ok(TaskStream {
            responses: Arc::clone(&self.responses),
            query: CandidateQuery {
                statuses: selection.eligible_statuses(),
                after_id: None,
                page_size: self.page_size,
                max_retries: selection.max_retries,
            },
            to_skip: selection.offset,
            remaining: selection.limit,
            preamble: self.preamble.clone(),
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }
}

/// Lazy, finite sequence of tasks in ascending response id order.
///
/// Pages are fetched on demand with a keyset cursor, so a response updated
/// during the run is never selected twice.
pub struct TaskStream {
    responses: Arc<dyn ResponseRepository>,
    query: CandidateQuery,
    to_skip: u64,
    remaining: Option<u64>,
    preamble: Option<String>,
    buffer: VecDeque<CandidateRecord>,
    exhausted: bool,
}

impl TaskStream {
    pub async fn next(&mut self) -> DomainResult<Option<VerificationTask>> {
        loop {
            if self.remaining == Some(0) {
                return Ok(None);
            }

            if let Some(record) = self.buffer.pop_front() {
                if self.to_skip > 0 {
                    self.to_skip -= 1;
                    continue;
                }
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                return Ok(Some(self.to_task(record)));
            }

            if self.exhausted {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    /// Drain the stream into a vector.
    pub async fn collect(mut self) -> DomainResult<Vec<VerificationTask>> {
        let mut tasks = Vec::new();
        while let Some(task) = self.next().await? {
            tasks.push(task);
        }
        Ok(tasks)
    }

    async fn fetch_page(&mut self) -> DomainResult<()> {
        let page = self.responses.fetch_candidates(&self.query).await?;
        if page.len() < self.query.page_size as usize {
            self.exhausted = true;
        }
        match page.last() {
            Some(last) => self.query.after_id = Some(last.response_id.clone()),
            None => self.exhausted = true,
        }
        self.buffer.extend(page);
        Ok(())
    }

    fn to_task(&self, record: CandidateRecord) -> VerificationTask {
        let (test_cases, setup_error) = if record.problem_found {
            match record.test_cases.as_deref().map(TestCases::parse_stored) {
                Some(Ok(cases)) => (cases, None),
                Some(Err(err)) => {
                    tracing::warn!(
                        response_id = %record.response_id,
                        problem_id = %record.problem_id,
                        error = %err,
                        "unparseable test cases"
                    );
                    (TestCases::default(), Some(format!("Failed to parse test_cases JSON: {err}")))
                }
                None => (TestCases::default(), None),
            }
        } else {
            tracing::warn!(
                response_id = %record.response_id,
                problem_id = %record.problem_id,
                "problem not found"
            );
            let reason = DomainError::ProblemNotFound(record.problem_id.clone()).to_string();
            (TestCases::default(), Some(reason))
        };

        VerificationTask {
            response_id: record.response_id,
            problem_id: record.problem_id,
            code: record.code.unwrap_or_default(),
            test_cases,
            attempt: record.attempt,
            preamble: self.preamble.clone(),
            setup_error,
        }
    }
}
