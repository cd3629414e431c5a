//! SQLite implementation of the ProblemRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Problem, TestCases};
use crate::domain::ports::ProblemRepository;

#[derive(Clone)]
pub struct SqliteProblemRepository {
    pool: SqlitePool,
}

impl SqliteProblemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProblemRepository for SqliteProblemRepository {
    async fn insert(&self, problem: &Problem) -> DomainResult<()> {
        let test_cases = serde_json::to_string(&problem.test_cases)?;

        sqlx::query(
            "INSERT INTO problems (id, source, statement, difficulty, test_cases) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&problem.id)
        .bind(&problem.source)
        .bind(&problem.statement)
        .bind(&problem.difficulty)
        .bind(&test_cases)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> DomainResult<Option<Problem>> {
        let row: Option<ProblemRow> = sqlx::query_as(
            "SELECT id, source, statement, difficulty, test_cases FROM problems WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Problem::try_from).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct ProblemRow {
    id: String,
    source: Option<String>,
    statement: Option<String>,
    difficulty: Option<String>,
    test_cases: Option<String>,
}

impl TryFrom<ProblemRow> for Problem {
    type Error = DomainError;

    fn try_from(row: ProblemRow) -> Result<Self, Self::Error> {
        let test_cases = match row.test_cases.as_deref() {
            Some(raw) => TestCases::parse_stored(raw)?,
            None => TestCases::default(),
        };
        Ok(Problem {
            id: row.id,
            source: row.source,
            statement: row.statement,
            difficulty: row.difficulty,
            test_cases,
        })
    }
}
