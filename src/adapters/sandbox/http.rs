//! HTTP sandbox adapter speaking the SandboxFusion `run_code` protocol.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::SandboxConfig;
use crate::domain::ports::{RunOutcome, Sandbox, SandboxError, SandboxReport, SandboxRequest};

/// Configuration for the HTTP sandbox.
#[derive(Debug, Clone)]
pub struct HttpSandboxConfig {
    /// Base URL; requests go to `{endpoint}/run_code`
    pub endpoint: String,
    pub language: String,
    pub compile_timeout_secs: u64,
    pub run_timeout_secs: u64,
    /// Transport-level timeout for one HTTP exchange
    pub request_timeout: Duration,
}

impl From<&SandboxConfig> for HttpSandboxConfig {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            language: config.language.clone(),
            compile_timeout_secs: config.compile_timeout_secs,
            run_timeout_secs: config.run_timeout_secs,
            request_timeout: Duration::from_secs(config.task_timeout_secs),
        }
    }
}

#[derive(Debug, Serialize)]
struct RunCodeRequest<'a> {
    code: &'a str,
    stdin: &'a str,
    language: &'a str,
    compile_timeout: f64,
    run_timeout: f64,
    files: HashMap<String, String>,
    fetch_files: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RunCodeResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    compile_result: Option<CommandResult>,
    #[serde(default)]
    run_result: Option<CommandResult>,
}

#[derive(Debug, Deserialize)]
struct CommandResult {
    status: String,
    #[serde(default)]
    execution_time: Option<f64>,
    #[serde(default)]
    return_code: Option<i32>,
    #[serde(default)]
    stdout: Option<String>,
    #[serde(default)]
    stderr: Option<String>,
}

/// Sandbox reached over HTTP.
pub struct HttpSandbox {
    config: HttpSandboxConfig,
    client: Client,
}

impl HttpSandbox {
    pub fn new(config: HttpSandboxConfig) -> DomainResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DomainError::ValidationFailed(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    fn run_code_url(&self) -> String {
        format!("{}/run_code", self.config.endpoint)
    }

    fn transport_error(err: &reqwest::Error) -> SandboxError {
        if err.is_timeout() {
            SandboxError::Timeout
        } else if err.is_decode() {
            SandboxError::MalformedReply(err.to_string())
        } else {
            SandboxError::Unreachable(err.to_string())
        }
    }
}

fn parse_reply(reply: RunCodeResponse) -> Result<SandboxReport, SandboxError> {
    if reply.status == "SandboxError" {
        return Err(SandboxError::Internal(reply.message));
    }
    if reply.status != "Success" && reply.status != "Failed" {
        return Err(SandboxError::MalformedReply(format!(
            "unknown status '{}'",
            reply.status
        )));
    }

    match reply.run_result {
        Some(run) => {
            let outcome = match run.status.as_str() {
                "Finished" => RunOutcome::Finished,
                "TimeLimitExceeded" => RunOutcome::TimeLimitExceeded,
                _ => RunOutcome::Error,
            };
            Ok(SandboxReport {
                outcome,
                return_code: run.return_code,
                stdout: run.stdout.unwrap_or_default(),
                stderr: run.stderr.unwrap_or_default(),
                message: reply.message,
                execution_time: run.execution_time,
            })
        }
        // No run result: the program never ran, usually a compile failure.
        None => {
            let compile = reply.compile_result;
            let stderr = compile
                .as_ref()
                .and_then(|c| c.stderr.clone())
                .unwrap_or_default();
            let outcome = match compile.as_ref().map(|c| c.status.as_str()) {
                Some("TimeLimitExceeded") => RunOutcome::TimeLimitExceeded,
                _ => RunOutcome::Error,
            };
            Ok(SandboxReport {
                outcome,
                return_code: compile.as_ref().and_then(|c| c.return_code),
                stdout: String::new(),
                stderr,
                message: reply.message,
                execution_time: compile.and_then(|c| c.execution_time),
            })
        }
    }
}

#[async_trait]
impl Sandbox for HttpSandbox {
    fn name(&self) -> &'static str {
        "sandbox-fusion"
    }

    async fn submit(&self, request: &SandboxRequest) -> Result<SandboxReport, SandboxError> {
        #[allow(clippy::cast_precision_loss)]
        let body = RunCodeRequest {
            code: &request.code,
            stdin: &request.stdin,
            language: &self.config.language,
            compile_timeout: self.config.compile_timeout_secs as f64,
            run_timeout: self.config.run_timeout_secs as f64,
            files: HashMap::new(),
            fetch_files: Vec::new(),
        };

        let response = self
            .client
            .post(self.run_code_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::transport_error(&e))?;

        let status = response.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            return Err(SandboxError::PayloadTooLarge);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SandboxError::Http {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| Self::transport_error(&e))?;
        let reply: RunCodeResponse = serde_json::from_str(&text)
            .map_err(|e| SandboxError::MalformedReply(e.to_string()))?;

        parse_reply(reply)
    }
}
