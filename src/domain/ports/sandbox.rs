//! Sandbox port.
//!
//! A sandbox accepts one program plus stdin and reports how the run ended.
//! Judging the output against expectations happens above this port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One program execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SandboxRequest {
    pub code: String,
    pub stdin: String,
}

impl SandboxRequest {
    pub fn new(code: impl Into<String>, stdin: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            stdin: stdin.into(),
        }
    }
}

/// How the program run ended, as reported by the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// Ran to completion (any exit code)
    Finished,
    /// Hit the sandbox's per-run time limit
    TimeLimitExceeded,
    /// Did not run (compile error, runtime setup failure)
    Error,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Finished => "Finished",
            Self::TimeLimitExceeded => "TimeLimitExceeded",
            Self::Error => "Error",
        }
    }
}

/// Report of a single execution.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxReport {
    pub outcome: RunOutcome,
    pub return_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Sandbox-side message (e.g. compile diagnostics)
    pub message: String,
    pub execution_time: Option<f64>,
}

impl SandboxReport {
    pub fn finished(return_code: i32, stdout: impl Into<String>) -> Self {
        Self {
            outcome: RunOutcome::Finished,
            return_code: Some(return_code),
            stdout: stdout.into(),
            stderr: String::new(),
            message: String::new(),
            execution_time: None,
        }
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }
}

/// Failures of the sandbox itself, as opposed to failures of the program.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SandboxError {
    #[error("Sandbox request timed out")]
    Timeout,

    #[error("Sandbox rejected the request as too large")]
    PayloadTooLarge,

    #[error("Sandbox unreachable: {0}")]
    Unreachable(String),

    #[error("Sandbox returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Malformed sandbox reply: {0}")]
    MalformedReply(String),

    #[error("Sandbox internal error: {0}")]
    Internal(String),
}

/// Port for code execution services.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &'static str;

    /// Execute one program.
    async fn submit(&self, request: &SandboxRequest) -> Result<SandboxReport, SandboxError>;
}
