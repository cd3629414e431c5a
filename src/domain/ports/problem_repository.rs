//! Problem repository port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::Problem;

/// Read access to problems. Inserts exist for import tooling and fixtures.
#[async_trait]
pub trait ProblemRepository: Send + Sync {
    /// Insert a new problem.
    async fn insert(&self, problem: &Problem) -> DomainResult<()>;

    /// Get a problem by ID.
    async fn get(&self, id: &str) -> DomainResult<Option<Problem>>;
}
