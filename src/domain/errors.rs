//! Domain errors for the verification orchestrator.

use thiserror::Error;

/// Domain-level errors that can occur while selecting, verifying and
/// reconciling responses.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Response not found: {0}")]
    ResponseNotFound(String),

    #[error("Problem not found: {0}")]
    ProblemNotFound(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    /// The store rejected the statement because another writer holds the lock.
    /// Safe to retry.
    #[error("Database busy: {0}")]
    DatabaseBusy(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Batch update partially applied: {applied} row(s) committed, {unapplied} id(s) not applied: {reason}")]
    PartialBatch {
        applied: u64,
        unapplied: usize,
        reason: String,
    },

    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

impl DomainError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DatabaseBusy(_))
    }

    pub fn io(path: impl AsRef<std::path::Path>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        if is_busy(&err) {
            DomainError::DatabaseBusy(err.to_string())
        } else {
            DomainError::DatabaseError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), including their extended codes,
/// plus pool exhaustion.
fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db_err) => {
            let primary = db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);
            matches!(primary, Some(5 | 6)) || db_err.message().contains("database is locked")
        }
        _ => false,
    }
}
