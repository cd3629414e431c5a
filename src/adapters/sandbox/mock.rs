//! Mock sandbox for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::domain::ports::{RunOutcome, Sandbox, SandboxError, SandboxReport, SandboxRequest};

/// Scripted reply for one submission.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Finish with exit code 0 and stdout equal to stdin
    Echo,
    /// Finish with exit code 0 and this stdout
    Stdout(String),
    /// Finish with a non-zero exit code
    Exit { return_code: i32, stderr: String },
    /// Report the per-run time limit as exceeded
    TimeLimit,
    /// Fail at the transport level
    Fail(SandboxError),
}

impl MockReply {
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self::Stdout(stdout.into())
    }
}

/// Mock sandbox. Replies are chosen by the first override whose marker is a
/// substring of the submitted code, falling back to the default reply.
pub struct MockSandbox {
    default_reply: MockReply,
    overrides: Arc<RwLock<Vec<(String, MockReply)>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockSandbox {
    pub fn new() -> Self {
        Self::with_default_reply(MockReply::Echo)
    }

    pub fn with_default_reply(reply: MockReply) -> Self {
        Self {
            default_reply: reply,
            overrides: Arc::new(RwLock::new(Vec::new())),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Hold every submission for `delay` before replying.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reply with `reply` whenever the submitted code contains `marker`.
    pub async fn set_reply_for(&self, marker: impl Into<String>, reply: MockReply) {
        self.overrides.write().await.push((marker.into(), reply));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of submissions observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn reply_for(&self, code: &str) -> MockReply {
        let overrides = self.overrides.read().await;
        overrides
            .iter()
            .find(|(marker, _)| code.contains(marker.as_str()))
            .map_or_else(|| self.default_reply.clone(), |(_, reply)| reply.clone())
    }
}

impl Default for MockSandbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sandbox for MockSandbox {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn submit(&self, request: &SandboxRequest) -> Result<SandboxReport, SandboxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.reply_for(&request.code).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            MockReply::Echo => Ok(SandboxReport::finished(0, request.stdin.clone())),
            MockReply::Stdout(stdout) => Ok(SandboxReport::finished(0, stdout)),
            MockReply::Exit { return_code, stderr } => {
                Ok(SandboxReport::finished(return_code, "").with_stderr(stderr))
            }
            MockReply::TimeLimit => Ok(SandboxReport {
                outcome: RunOutcome::TimeLimitExceeded,
                return_code: None,
                stdout: String::new(),
                stderr: String::new(),
                message: String::new(),
                execution_time: None,
            }),
            MockReply::Fail(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_and_overrides() {
        let sandbox = MockSandbox::new();
        sandbox
            .set_reply_for("boom", MockReply::Fail(SandboxError::Timeout))
            .await;

        let echoed = sandbox.submit(&SandboxRequest::new("print(input())", "hi")).await.unwrap();
        assert_eq!(echoed.stdout, "hi");

        let failed = sandbox.submit(&SandboxRequest::new("boom()", "")).await;
        assert_eq!(failed.unwrap_err(), SandboxError::Timeout);
        assert_eq!(sandbox.calls(), 2);
    }
}
