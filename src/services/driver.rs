//! Program generation and output judging for sandbox runs.
//!
//! Test cases run in one of two modes. With a function name, a driver script
//! calls the function with the case's arguments and compares the return value
//! in-process. Without one, the candidate reads the case input from stdin and
//! its stdout is compared with the expected output.

use regex::Regex;
use serde_json::Value;

use crate::domain::models::{MatchMode, TestCaseOutcome};
use crate::domain::ports::{RunOutcome, SandboxReport, SandboxRequest};

/// Import prelude prepended to every candidate program.
pub const DEFAULT_PREAMBLE: &str = "\
from string import *
from re import *
from datetime import *
from collections import *
from heapq import *
from bisect import *
from copy import *
from math import *
from random import *
from statistics import *
from itertools import *
from functools import *
from operator import *
from io import *
from sys import *
from json import *
from builtins import *
from typing import *
import string
import re
import datetime
import collections
import heapq
import bisect
import copy
import math
import random
import statistics
import itertools
import functools
import operator
import io
import sys
import json
sys.setrecursionlimit(50000)
";

/// Line printed by some sandbox images before the program's own output.
const SANDBOX_BANNER: &str = "User customization module loaded!";

const EXPECTED_CHARS: usize = 100;
const ERROR_CHARS: usize = 200;
const FLOAT_TOLERANCE: f64 = 1e-6;

/// How a task's test cases are executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseMode {
    /// Call `target` (a function or `Solution().method`) with the case arguments
    Function { target: String },
    /// Feed the case input on stdin
    Stdio,
}

impl CaseMode {
    pub fn for_task(code: &str, fn_name: Option<&str>) -> Self {
        match fn_name.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => Self::Function {
                target: call_target(code, name),
            },
            None => Self::Stdio,
        }
    }
}

/// `Solution().name` when `name` is defined inside a `class Solution`,
/// otherwise `name`.
pub fn call_target(code: &str, fn_name: &str) -> String {
    let pattern = format!(
        r"(?s)class\s+Solution\s*:.*?def\s+{}\s*\(",
        regex::escape(fn_name)
    );
    match Regex::new(&pattern) {
        Ok(re) if re.is_match(code) => format!("Solution().{fn_name}"),
        _ => fn_name.to_string(),
    }
}

/// Render a JSON value as a Python literal.
pub fn python_literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => python_str(s),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(python_literal).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", python_str(k), python_literal(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

fn python_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Build the sandbox request for one test case.
pub fn build_request(mode: &CaseMode, preamble: &str, code: &str, input: &Value, expected: &Value) -> SandboxRequest {
    match mode {
        CaseMode::Function { target } => {
            SandboxRequest::new(function_driver(preamble, code, target, input, expected), "")
        }
        CaseMode::Stdio => SandboxRequest::new(format!("{preamble}\n{code}"), stdio_text(input)),
    }
}

/// A list input is the argument list; anything else is a single argument.
fn function_driver(preamble: &str, code: &str, target: &str, input: &Value, expected: &Value) -> String {
    let args = match input {
        Value::Array(_) => python_literal(input),
        other => format!("[{}]", python_literal(other)),
    };
    let expected = python_literal(expected);

    format!(
        r#"{preamble}
import sys
import json

# Solution Code
{code}

# Test Driver
try:
    args = {args}
    expected = {expected}

    result = {target}(*args)

    if result == expected:
        print("PASSED")
    else:
        print("FAILED")
        print(f"FAILED: Expected {{expected}}, got {{result}}", file=sys.stderr)
        sys.exit(1)
except Exception as e:
    print("RUNTIME ERROR")
    print(f"RUNTIME ERROR: {{e}}", file=sys.stderr)
    sys.exit(1)
"#
    )
}

/// Text form of a stdio input or expected output. Lists are joined by newlines.
pub fn stdio_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(stdio_text).collect::<Vec<_>>().join("\n"),
        Value::Null => String::new(),
        other => python_literal(other),
    }
}

/// Drop sandbox banner lines.
pub fn clean_sandbox_output(output: &str) -> String {
    output
        .split('\n')
        .filter(|line| line.trim() != SANDBOX_BANNER)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Trim every line, then the whole text.
pub fn normalize_output(output: &str) -> String {
    output
        .split('\n')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Last non-empty stdout line that is not a `class`/`def` line.
pub fn extract_function_output(stdout: &str) -> String {
    stdout
        .split('\n')
        .rev()
        .find(|line| {
            let stripped = line.trim_start();
            !stripped.is_empty() && !stripped.starts_with("class ") && !stripped.starts_with("def ")
        })
        .map(|line| line.trim().to_string())
        .unwrap_or_default()
}

/// Text an expected value is compared against. Function-mode values that
/// are not strings use their Python rendering.
fn expected_text(mode: &CaseMode, expected: &Value) -> String {
    match (mode, expected) {
        (CaseMode::Function { .. }, Value::String(s)) => s.clone(),
        (CaseMode::Function { .. }, other) => python_literal(other),
        (CaseMode::Stdio, other) => stdio_text(other),
    }
}

/// Lines of a `[...]` list literal (JSON or Python syntax), one item per line.
pub fn list_literal_lines(text: &str) -> Option<String> {
    let text = text.trim();
    let inner = text.strip_prefix('[')?.strip_suffix(']')?;
    let items = match serde_json::from_str::<Vec<Value>>(text) {
        Ok(values) => values
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => python_literal(other),
            })
            .collect(),
        Err(_) => python_list_items(inner)?,
    };
    Some(items.join("\n"))
}

/// Items of a flat Python list body: quoted strings, numbers, `True`,
/// `False` and `None`. Anything else is not a list we understand.
fn python_list_items(inner: &str) -> Option<Vec<String>> {
    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(&first) = chars.peek() else {
            break;
        };
        let item = if first == '\'' || first == '"' {
            chars.next();
            let mut item = String::new();
            loop {
                match chars.next()? {
                    '\\' => match chars.next()? {
                        'n' => item.push('\n'),
                        't' => item.push('\t'),
                        escaped => item.push(escaped),
                    },
                    c if c == first => break,
                    c => item.push(c),
                }
            }
            item
        } else {
            let mut token = String::new();
            while let Some(c) = chars.next_if(|c| *c != ',') {
                token.push(c);
            }
            let token = token.trim();
            if token.parse::<f64>().is_err() && !matches!(token, "True" | "False" | "None") {
                return None;
            }
            token.to_string()
        };
        items.push(item);

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            None => break,
            Some(',') => {}
            Some(_) => return None,
        }
    }
    Some(items)
}

/// Exact, case-insensitive, or token-wise equality where numeric tokens may
/// differ by less than 1e-6.
pub fn fuzzy_match(expected: &str, actual: &str) -> bool {
    let (expected, actual) = (expected.trim(), actual.trim());
    if expected == actual || expected.to_lowercase() == actual.to_lowercase() {
        return true;
    }
    let expected: Vec<&str> = expected.split_whitespace().collect();
    let actual: Vec<&str> = actual.split_whitespace().collect();
    expected.len() == actual.len()
        && expected
            .iter()
            .zip(&actual)
            .all(|(e, a)| tokens_match(e, a))
}

fn tokens_match(expected: &str, actual: &str) -> bool {
    if expected == actual || expected.to_lowercase() == actual.to_lowercase() {
        return true;
    }
    match (expected.parse::<f64>(), actual.parse::<f64>()) {
        (Ok(e), Ok(a)) => (e - a).abs() < FLOAT_TOLERANCE,
        _ => false,
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Judge one sandbox report against the expected value.
pub fn judge_case(
    index: usize,
    mode: &CaseMode,
    matching: MatchMode,
    expected: &Value,
    report: &SandboxReport,
) -> TestCaseOutcome {
    let actual = clean_sandbox_output(&report.stdout).trim().to_string();
    let mut expected_raw = expected_text(mode, expected);
    if matching == MatchMode::Fuzzy && *mode == CaseMode::Stdio {
        if let Some(lines) = list_literal_lines(&expected_raw) {
            expected_raw = lines;
        }
    }
    let expected_text = normalize_output(&clean_sandbox_output(&expected_raw));
    let equals_expected = |got: &str| match matching {
        MatchMode::Exact => got == expected_text,
        MatchMode::Fuzzy => fuzzy_match(&expected_text, got),
    };

    let (passed, error) = match report.outcome {
        RunOutcome::TimeLimitExceeded => (false, "time limit exceeded".to_string()),
        RunOutcome::Error => {
            let reason = if report.message.is_empty() {
                report.stderr.clone()
            } else {
                report.message.clone()
            };
            (false, reason)
        }
        RunOutcome::Finished => {
            let exited_cleanly = report.return_code == Some(0);
            let got = match mode {
                CaseMode::Function { .. } => extract_function_output(&actual),
                CaseMode::Stdio => normalize_output(&actual),
            };
            let matched = match mode {
                CaseMode::Function { .. } => equals_expected(&got) || actual.contains("PASSED"),
                CaseMode::Stdio => equals_expected(&got),
            };
            if exited_cleanly && matched {
                (true, String::new())
            } else if !exited_cleanly && !report.stderr.is_empty() {
                (false, report.stderr.trim().to_string())
            } else {
                (
                    false,
                    format!(
                        "Expected: {}..., Got: {}...",
                        truncate(&expected_text, EXPECTED_CHARS),
                        truncate(&got, EXPECTED_CHARS)
                    ),
                )
            }
        }
    };

    TestCaseOutcome {
        index,
        passed,
        expected: truncate(&expected_raw, EXPECTED_CHARS),
        actual: truncate(&actual, EXPECTED_CHARS),
        status: report.outcome.as_str().to_string(),
        return_code: report.return_code,
        error: truncate(&error, ERROR_CHARS),
    }
}
