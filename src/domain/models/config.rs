use serde::{Deserialize, Serialize};

use super::verification::MatchMode;

/// Main configuration structure for the verifier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Sandbox endpoint and execution limits
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Task selection and worker pool settings
    #[serde(default)]
    pub verification: VerificationConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".verifier/responses.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation for file logs: hourly, daily or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SandboxConfig {
    /// Base URL of the sandbox service
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Language passed to the sandbox
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_compile_timeout_secs")]
    pub compile_timeout_secs: u64,

    /// Per-test-case run limit enforced by the sandbox
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    /// Deadline for a whole task, enforced client-side
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    /// Optional request rate limit across all workers
    #[serde(default)]
    pub requests_per_second: Option<f64>,

    /// Import prelude prepended to candidate code; the built-in prelude when unset
    #[serde(default)]
    pub preamble: Option<String>,
}

fn default_endpoint() -> String {
    "http://localhost:8080".to_string()
}

fn default_language() -> String {
    "python".to_string()
}

const fn default_compile_timeout_secs() -> u64 {
    10
}

const fn default_run_timeout_secs() -> u64 {
    10
}

const fn default_task_timeout_secs() -> u64 {
    120
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            language: default_language(),
            compile_timeout_secs: default_compile_timeout_secs(),
            run_timeout_secs: default_run_timeout_secs(),
            task_timeout_secs: default_task_timeout_secs(),
            requests_per_second: None,
            preamble: None,
        }
    }
}

/// Verification run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VerificationConfig {
    /// Worker pool size for online verification (1-256)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Rows fetched per store round trip by the task builder
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Responses whose retry count reached this ceiling are no longer selected
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Output matching used by the offline worker
    #[serde(default = "default_worker_match")]
    pub worker_match: MatchMode,
}

const fn default_concurrency() -> usize {
    8
}

const fn default_page_size() -> u32 {
    500
}

const fn default_worker_match() -> MatchMode {
    MatchMode::Fuzzy
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            page_size: default_page_size(),
            max_retries: None,
            worker_match: default_worker_match(),
        }
    }
}
