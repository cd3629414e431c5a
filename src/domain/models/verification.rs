//! Verification tasks and results.
//!
//! Both types are the line formats of the offline task and result files, so
//! their serde layout is a compatibility surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::problem::TestCases;
use super::status::Verdict;

/// Self-contained unit of work derived from one response and its problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationTask {
    /// Originating response identifier
    #[serde(rename = "id")]
    pub response_id: String,
    #[serde(default)]
    pub problem_id: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub test_cases: TestCases,
    /// Value of the response's `attempt` counter when the task was built
    #[serde(default)]
    pub attempt: u32,
    /// Import prelude prepended to the candidate code
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "import_string")]
    pub preamble: Option<String>,
    /// Why the task's test cases could not be loaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_error: Option<String>,
}

/// How a test case's output is compared with its expected value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Whitespace-normalized text equality
    #[default]
    Exact,
    /// Exact, then case-insensitive, then token-wise with a float tolerance;
    /// a list-literal expected stdout is compared line by line
    Fuzzy,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Fuzzy => "fuzzy",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "exact" => Some(Self::Exact),
            "fuzzy" => Some(Self::Fuzzy),
            _ => None,
        }
    }
}

/// Outcome of executing one test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseOutcome {
    pub index: usize,
    pub passed: bool,
    #[serde(default)]
    pub expected: String,
    #[serde(default)]
    pub actual: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub return_code: Option<i32>,
    #[serde(default)]
    pub error: String,
}

/// Outcome of executing one verification task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    #[serde(rename = "id")]
    pub response_id: String,
    #[serde(rename = "verification_status", alias = "verdict")]
    pub verdict: Verdict,
    /// Per-case outcomes, or an object describing why execution did not happen
    #[serde(rename = "verification_details", default)]
    pub details: Value,
    /// Echo of the task's attempt number; absent for results from workers
    /// that do not carry it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl VerificationResult {
    pub fn new(task: &VerificationTask, verdict: Verdict, details: Value) -> Self {
        Self {
            response_id: task.response_id.clone(),
            verdict,
            details,
            attempt: Some(task.attempt),
            elapsed_ms: None,
        }
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = Some(elapsed_ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_line_layout() {
        let task = VerificationTask {
            response_id: "r1".into(),
            problem_id: "p1".into(),
            code: "print(1)".into(),
            test_cases: TestCases::stdio([("", "1")]),
            attempt: 2,
            preamble: None,
            setup_error: None,
        };
        let line = serde_json::to_value(&task).unwrap();
        assert_eq!(line["id"], "r1");
        assert_eq!(line["attempt"], 2);
        assert!(line.get("preamble").is_none());
        assert!(line.get("setup_error").is_none());
    }

    #[test]
    fn test_task_accepts_import_string_alias() {
        let task: VerificationTask = serde_json::from_value(json!({
            "id": "r9",
            "code": "x = 1",
            "test_cases": {"inputs": ["1"], "outputs": ["1"]},
            "import_string": "import math"
        }))
        .unwrap();
        assert_eq!(task.preamble.as_deref(), Some("import math"));
        assert_eq!(task.attempt, 0);
    }

    #[test]
    fn test_result_without_attempt() {
        let result: VerificationResult = serde_json::from_str(
            r#"{"id": "r1", "verification_status": "failed", "verification_details": [{"index": 0, "passed": false}]}"#,
        )
        .unwrap();
        assert_eq!(result.verdict, Verdict::Failed);
        assert_eq!(result.attempt, None);
    }

    #[test]
    fn test_result_verdict_alias() {
        let result: VerificationResult =
            serde_json::from_str(r#"{"id": "r1", "verdict": "timeout", "attempt": 3}"#).unwrap();
        assert_eq!(result.verdict, Verdict::Timeout);
        assert_eq!(result.attempt, Some(3));
        assert_eq!(result.details, Value::Null);
    }

    #[test]
    fn test_result_rejects_unknown_verdict() {
        let parsed: Result<VerificationResult, _> =
            serde_json::from_str(r#"{"id": "r1", "verification_status": "maybe"}"#);
        assert!(parsed.is_err());
    }
}
