//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces implemented by adapters:
//! - ResponseRepository: response selection and guarded status writes
//! - ProblemRepository: read access to problems and their test cases
//! - Sandbox: isolated code execution

pub mod problem_repository;
pub mod response_repository;
pub mod sandbox;

pub use problem_repository::ProblemRepository;
pub use response_repository::{
    BatchWrite, CandidateQuery, CandidateRecord, GroupCounts, ResponseFilter, ResponseGrouping, ResponseRepository,
    StatusUpdate,
};
pub use sandbox::{RunOutcome, Sandbox, SandboxError, SandboxReport, SandboxRequest};
