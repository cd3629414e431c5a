//! Verification status state machine.
//!
//! Status values form a closed set. The next status of a response is a pure
//! function of its current status and the verdict produced by the sandbox;
//! only an explicit bulk update may move a response out of `passed`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::errors::{DomainError, DomainResult};

/// Persisted verification status of a response.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Not yet verified
    #[default]
    Pending,
    /// Every test case passed
    Passed,
    /// At least one test case failed
    Failed,
    /// Verification could not run to completion
    Error,
    /// Not verifiable (no code, payload rejected by the sandbox)
    Skipped,
}

impl VerificationStatus {
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Passed,
        Self::Failed,
        Self::Error,
        Self::Skipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            "error" => Some(Self::Error),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Parse a status name, failing with a validation error for anything
    /// outside the closed set.
    pub fn parse(s: &str) -> DomainResult<Self> {
        Self::from_str(s).ok_or_else(|| {
            DomainError::ValidationFailed(format!(
                "unknown status '{}'; expected one of: {}",
                s.trim(),
                Self::ALL.map(|st| st.as_str()).join(", ")
            ))
        })
    }

    /// Check if this is a terminal state under normal verification flow.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Statuses that may be re-selected for another verification attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed | Self::Error | Self::Skipped)
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a retry-status set: a comma-separated list of status names, or `all`
/// for every non-terminal status.
///
/// Unknown names and `passed` are rejected before any work begins.
pub fn parse_retry_set(list: &str) -> DomainResult<Vec<VerificationStatus>> {
    let list = list.trim();
    if list.eq_ignore_ascii_case("all") {
        return Ok(VerificationStatus::ALL
            .into_iter()
            .filter(|s| !s.is_terminal())
            .collect());
    }

    let mut statuses = Vec::new();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let status = VerificationStatus::parse(name)?;
        if status.is_terminal() {
            return Err(DomainError::ValidationFailed(format!(
                "status '{status}' is terminal and cannot be part of a retry set"
            )));
        }
        if !statuses.contains(&status) {
            statuses.push(status);
        }
    }
    Ok(statuses)
}

/// Sandbox judgment of one verification task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed,
    Error,
    Timeout,
    Skipped,
}

impl Verdict {
    pub const ALL: [Self; 5] = [
        Self::Passed,
        Self::Failed,
        Self::Error,
        Self::Timeout,
        Self::Skipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::Skipped => "skipped",
        }
    }

    /// Status a pending response moves to on this verdict.
    pub fn first_status(&self) -> VerificationStatus {
        match self {
            Self::Passed => VerificationStatus::Passed,
            Self::Failed => VerificationStatus::Failed,
            Self::Error | Self::Timeout => VerificationStatus::Error,
            Self::Skipped => VerificationStatus::Skipped,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of applying a verdict to a response's current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Write `status`; bump the retry counter when `increment_retry` is set.
    Advance {
        status: VerificationStatus,
        increment_retry: bool,
    },
    /// The response is terminal; the verdict is ignored.
    Terminal,
}

/// The transition table.
///
/// ```text
/// pending   --passed-->              passed (terminal)
/// pending   --failed-->              failed
/// pending   --error/timeout-->       error
/// pending   --skipped-->             skipped
/// retryable --passed-->              passed
/// retryable --anything else-->       unchanged status, retry_count + 1
/// passed    --anything-->            no-op
/// ```
pub fn next_status(current: VerificationStatus, verdict: Verdict) -> Transition {
    match current {
        VerificationStatus::Passed => Transition::Terminal,
        VerificationStatus::Pending => Transition::Advance {
            status: verdict.first_status(),
            increment_retry: false,
        },
        VerificationStatus::Failed | VerificationStatus::Error | VerificationStatus::Skipped => {
            if verdict == Verdict::Passed {
                Transition::Advance {
                    status: VerificationStatus::Passed,
                    increment_retry: false,
                }
            } else {
                Transition::Advance {
                    status: current,
                    increment_retry: true,
                }
            }
        }
    }
}
