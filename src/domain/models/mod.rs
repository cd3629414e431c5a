pub mod config;
pub mod problem;
pub mod response;
pub mod status;
pub mod summary;
pub mod verification;

pub use config::{Config, DatabaseConfig, LoggingConfig, SandboxConfig, VerificationConfig};
pub use problem::{Problem, TestCases};
pub use response::Response;
pub use status::{next_status, parse_retry_set, Transition, Verdict, VerificationStatus};
pub use summary::RunSummary;
pub use verification::{MatchMode, TestCaseOutcome, VerificationResult, VerificationTask};
