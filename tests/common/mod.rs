//! Common test utilities for integration tests
//!
//! Provides an in-memory migrated store, seeding helpers and a verification
//! context wired to a scripted sandbox.

#![allow(dead_code)]

use std::sync::Arc;

use response_verifier::adapters::sandbox::MockSandbox;
use response_verifier::adapters::sqlite::{
    create_migrated_test_pool, SqliteProblemRepository, SqliteResponseRepository,
};
use response_verifier::domain::models::{Config, Problem, Response, TestCases, VerificationStatus};
use response_verifier::domain::ports::{ProblemRepository, ResponseRepository};
use response_verifier::services::VerificationContext;

/// Program that echoes its input; passes any stdio case where input equals output.
pub const ECHO_PROGRAM: &str = "print(input())";

pub struct Store {
    pub responses: Arc<SqliteResponseRepository>,
    pub problems: SqliteProblemRepository,
}

impl Store {
    pub async fn new() -> Self {
        let pool = create_migrated_test_pool().await.expect("Failed to create test pool");
        Self {
            responses: Arc::new(SqliteResponseRepository::new(pool.clone())),
            problems: SqliteProblemRepository::new(pool),
        }
    }

    pub async fn problem(&self, id: &str, cases: TestCases) {
        self.problems
            .insert(&Problem::new(id, cases))
            .await
            .expect("Failed to insert problem");
    }

    pub async fn response(&self, id: &str, problem_id: &str, code: &str, status: VerificationStatus) {
        self.responses
            .insert(&Response::new(id, problem_id).with_code(code).with_status(status))
            .await
            .expect("Failed to insert response");
    }

    /// `count` pending echo responses `r00..` on problem `p-echo`.
    pub async fn echo_batch(&self, count: usize) {
        self.problem("p-echo", TestCases::stdio([("hello", "hello"), ("42", "42")]))
            .await;
        for i in 0..count {
            self.response(&format!("r{i:02}"), "p-echo", ECHO_PROGRAM, VerificationStatus::Pending)
                .await;
        }
    }

    pub async fn stored(&self, id: &str) -> Response {
        self.responses
            .get(id)
            .await
            .expect("Failed to read response")
            .expect("Response missing")
    }

    pub async fn count(&self, status: VerificationStatus) -> u64 {
        self.responses
            .count_by_status()
            .await
            .expect("Failed to count")
            .get(&status)
            .copied()
            .unwrap_or(0)
    }

    pub fn context(&self, sandbox: Arc<MockSandbox>) -> VerificationContext {
        VerificationContext::new(self.responses.clone(), sandbox, Config::default())
            .expect("Failed to build context")
    }
}
