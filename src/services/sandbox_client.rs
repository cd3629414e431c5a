//! Sandbox client: executes one verification task and always yields a result.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::driver::{build_request, judge_case, CaseMode, DEFAULT_PREAMBLE};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{MatchMode, SandboxConfig, TestCaseOutcome, Verdict, VerificationResult, VerificationTask};
use crate::domain::ports::{Sandbox, SandboxError};

/// Execution limits applied by the client.
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    /// Deadline for all test cases of one task
    pub task_timeout: Duration,
    /// Import prelude used when the task carries none
    pub preamble: String,
    pub requests_per_second: Option<f64>,
    pub match_mode: MatchMode,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(120),
            preamble: DEFAULT_PREAMBLE.to_string(),
            requests_per_second: None,
            match_mode: MatchMode::Exact,
        }
    }
}

impl From<&SandboxConfig> for ExecutionSettings {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            task_timeout: Duration::from_secs(config.task_timeout_secs),
            preamble: config
                .preamble
                .clone()
                .unwrap_or_else(|| DEFAULT_PREAMBLE.to_string()),
            requests_per_second: config.requests_per_second,
            match_mode: MatchMode::Exact,
        }
    }
}

pub struct SandboxClient {
    sandbox: Arc<dyn Sandbox>,
    settings: ExecutionSettings,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl SandboxClient {
    pub fn new(sandbox: Arc<dyn Sandbox>, settings: ExecutionSettings) -> DomainResult<Self> {
        let limiter = settings
            .requests_per_second
            .map(|rps| {
                if !rps.is_finite() || rps <= 0.0 {
                    return Err(DomainError::ValidationFailed(format!(
                        "requests_per_second must be positive, got {rps}"
                    )));
                }
                let period = Duration::from_secs_f64(1.0 / rps);
                let quota = Quota::with_period(period)
                    .ok_or_else(|| DomainError::ValidationFailed(format!("rate {rps}/s is too high")))?
                    .allow_burst(NonZeroU32::MIN);
                Ok(Arc::new(RateLimiter::direct(quota)))
            })
            .transpose()?;

        Ok(Self {
            sandbox,
            settings,
            limiter,
        })
    }

    /// Same sandbox and rate limit, judging outputs with `match_mode`.
    pub fn with_match_mode(&self, match_mode: MatchMode) -> Self {
        Self {
            sandbox: Arc::clone(&self.sandbox),
            settings: ExecutionSettings {
                match_mode,
                ..self.settings.clone()
            },
            limiter: self.limiter.clone(),
        }
    }

    pub fn match_mode(&self) -> MatchMode {
        self.settings.match_mode
    }

    pub fn sandbox_name(&self) -> &'static str {
        self.sandbox.name()
    }

    /// Execute every test case of `task`. Sandbox-side failures become
    /// `error`, `timeout` or `skipped` verdicts; this never fails.
    pub async fn execute(&self, task: &VerificationTask) -> VerificationResult {
        let started = Instant::now();
        let (verdict, details) = self.judge(task).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        tracing::debug!(
            response_id = %task.response_id,
            verdict = %verdict,
            elapsed_ms,
            "task verified"
        );
        VerificationResult::new(task, verdict, details).with_elapsed_ms(elapsed_ms)
    }

    async fn judge(&self, task: &VerificationTask) -> (Verdict, Value) {
        if task.code.trim().is_empty() {
            return (Verdict::Skipped, json!({"reason": "no extracted code"}));
        }
        if let Some(reason) = &task.setup_error {
            return (Verdict::Error, json!({"error": reason}));
        }
        if task.test_cases.is_empty() {
            return (Verdict::Error, json!({"error": "no test cases found"}));
        }

        match tokio::time::timeout(self.settings.task_timeout, self.run_cases(task)).await {
            Err(_) => (
                Verdict::Timeout,
                json!({"error": format!("task exceeded {}s deadline", self.settings.task_timeout.as_secs())}),
            ),
            Ok(Err(err)) => {
                tracing::warn!(response_id = %task.response_id, error = %err, "sandbox transport failure");
                verdict_for_transport_error(&err)
            }
            Ok(Ok(outcomes)) => {
                let verdict = if outcomes.iter().all(|o| o.passed) {
                    Verdict::Passed
                } else {
                    Verdict::Failed
                };
                (verdict, serde_json::to_value(&outcomes).unwrap_or_default())
            }
        }
    }

    async fn run_cases(&self, task: &VerificationTask) -> Result<Vec<TestCaseOutcome>, SandboxError> {
        let mode = CaseMode::for_task(&task.code, task.test_cases.fn_name.as_deref());
        let preamble = task.preamble.as_deref().unwrap_or(&self.settings.preamble);

        let mut outcomes = Vec::with_capacity(task.test_cases.len());
        for (index, (input, expected)) in task.test_cases.cases().enumerate() {
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }
            let request = build_request(&mode, preamble, &task.code, input, expected);
            let report = self.sandbox.submit(&request).await?;
            outcomes.push(judge_case(index, &mode, self.settings.match_mode, expected, &report));
        }
        Ok(outcomes)
    }
}

fn verdict_for_transport_error(err: &SandboxError) -> (Verdict, Value) {
    let message: String = err.to_string().chars().take(500).collect();
    match err {
        SandboxError::Timeout => (Verdict::Timeout, json!({"error": message})),
        SandboxError::PayloadTooLarge => (
            Verdict::Skipped,
            json!({"reason": "request_too_large", "error": message}),
        ),
        _ => (Verdict::Error, json!({"error": message})),
    }
}
