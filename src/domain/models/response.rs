//! Response domain model.
//!
//! A response is one model-generated candidate solution to a problem. Its
//! verification fields are mutated only by result reconciliation and by bulk
//! status updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::status::VerificationStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub problem_id: String,
    pub model: Option<String>,
    /// Code extracted from the generated text, if any
    pub extracted_code: Option<String>,
    pub status: VerificationStatus,
    pub details: Option<Value>,
    pub retry_count: u32,
    /// Number of verification results applied so far. Guards every
    /// reconciliation write.
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Response {
    pub fn new(id: impl Into<String>, problem_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            problem_id: problem_id.into(),
            model: None,
            extracted_code: None,
            status: VerificationStatus::Pending,
            details: None,
            retry_count: 0,
            attempt: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.extracted_code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: VerificationStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}
