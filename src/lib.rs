//! Response Verifier
//!
//! Verifies model-generated code responses by running them against their
//! problem's test cases in a remote sandbox, and records a verification
//! status per response in SQLite.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, the status state machine, ports
//! - **Adapters** (`adapters`): SQLite repositories and sandbox clients
//! - **Service Layer** (`services`): task building, dispatch, reconciliation
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! Verification runs online (bounded worker pool), or offline as a dump of
//! tasks to JSONL, independent workers, and an ingest of result files.

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::models::{
    Config, Problem, Response, RunSummary, TestCases, Verdict, VerificationResult, VerificationStatus,
    VerificationTask,
};
pub use domain::ports::{ProblemRepository, ResponseRepository, Sandbox};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{Dispatcher, OfflineWorker, ResultReconciler, SandboxClient, StatusLedger, TaskBuilder, VerificationContext};
