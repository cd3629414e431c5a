//! Problem domain model.
//!
//! Problems are imported by an external collaborator and are read-only here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::errors::{DomainError, DomainResult};

/// A task definition with the test cases used to judge responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    /// Unique identifier (`custom_id`)
    pub id: String,
    pub source: Option<String>,
    pub statement: Option<String>,
    pub difficulty: Option<String>,
    pub test_cases: TestCases,
}

impl Problem {
    pub fn new(id: impl Into<String>, test_cases: TestCases) -> Self {
        Self {
            id: id.into(),
            source: None,
            statement: None,
            difficulty: None,
            test_cases,
        }
    }

    pub fn with_difficulty(mut self, difficulty: impl Into<String>) -> Self {
        self.difficulty = Some(difficulty.into());
        self
    }
}

/// Ordered input/output pairs.
///
/// When `fn_name` is set, inputs are argument lists for that function and
/// outputs are return values; otherwise inputs are stdin payloads and outputs
/// are expected stdout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestCases {
    #[serde(default)]
    pub inputs: Vec<Value>,
    #[serde(default)]
    pub outputs: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fn_name: Option<String>,
}

impl TestCases {
    /// Stdio test cases from string pairs.
    pub fn stdio<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let (inputs, outputs) = pairs
            .into_iter()
            .map(|(i, o)| (Value::String(i.into()), Value::String(o.into())))
            .unzip();
        Self { inputs, outputs, fn_name: None }
    }

    /// Parse the stored JSON column. Accepts a double-encoded JSON string.
    pub fn parse_stored(raw: &str) -> DomainResult<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let value = match value {
            Value::String(inner) => serde_json::from_str(&inner)?,
            other => other,
        };
        match value {
            Value::Object(_) => Ok(serde_json::from_value(value)?),
            Value::Null => Ok(Self::default()),
            other => Err(DomainError::SerializationError(format!(
                "test cases must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Number of usable cases; unmatched trailing inputs or outputs are ignored.
    pub fn len(&self) -> usize {
        self.inputs.len().min(self.outputs.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate `(input, expected_output)` pairs.
    pub fn cases(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.inputs.iter().zip(self.outputs.iter())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
