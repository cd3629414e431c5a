//! SQLite implementation of the ResponseRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashMap;

use super::{parse_datetime, parse_json_opt};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Response, VerificationStatus};
use crate::domain::ports::{
    BatchWrite, CandidateQuery, CandidateRecord, GroupCounts, ResponseFilter, ResponseGrouping, ResponseRepository,
    StatusUpdate,
};

#[derive(Clone)]
pub struct SqliteResponseRepository {
    pool: SqlitePool,
}

impl SqliteResponseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn status_list_json(statuses: &[VerificationStatus]) -> DomainResult<String> {
    Ok(serde_json::to_string(
        &statuses.iter().map(VerificationStatus::as_str).collect::<Vec<_>>(),
    )?)
}

#[async_trait]
impl ResponseRepository for SqliteResponseRepository {
    async fn insert(&self, response: &Response) -> DomainResult<()> {
        let details = response.details.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"INSERT INTO responses (id, problem_id, model, extracted_code, verification_status,
               verification_details, retry_count, attempt, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&response.id)
        .bind(&response.problem_id)
        .bind(&response.model)
        .bind(&response.extracted_code)
        .bind(response.status.as_str())
        .bind(details)
        .bind(i64::from(response.retry_count))
        .bind(i64::from(response.attempt))
        .bind(response.created_at.to_rfc3339())
        .bind(response.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> DomainResult<Option<Response>> {
        let row: Option<ResponseRow> = sqlx::query_as(
            r#"SELECT id, problem_id, model, extracted_code, verification_status, verification_details,
               retry_count, attempt, created_at, updated_at FROM responses WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Response::try_from).transpose()
    }

    async fn fetch_candidates(&self, query: &CandidateQuery) -> DomainResult<Vec<CandidateRecord>> {
        let statuses = status_list_json(&query.statuses)?;
        let max_retries = query.max_retries.map(i64::from);

        let rows: Vec<CandidateRow> = sqlx::query_as(
            r#"SELECT r.id AS response_id, r.problem_id, r.extracted_code AS code, r.attempt,
                      p.test_cases, p.id IS NOT NULL AS problem_found
               FROM responses r
               LEFT JOIN problems p ON p.id = r.problem_id
               WHERE r.verification_status IN (SELECT value FROM json_each(?))
                 AND (? IS NULL OR r.id > ?)
                 AND (? IS NULL OR r.verification_status = 'pending' OR r.retry_count < ?)
               ORDER BY r.id
               LIMIT ?"#,
        )
        .bind(&statuses)
        .bind(&query.after_id)
        .bind(&query.after_id)
        .bind(max_retries)
        .bind(max_retries)
        .bind(i64::from(query.page_size))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CandidateRecord::from).collect())
    }

    async fn compare_and_set(&self, update: &StatusUpdate) -> DomainResult<u64> {
        let details = serde_json::to_string(&update.details)?;
        let expected_attempt = update.expected_attempt.map(i64::from);

        let result = sqlx::query(
            r#"UPDATE responses
               SET verification_status = ?,
                   verification_details = ?,
                   retry_count = retry_count + ?,
                   attempt = attempt + (CASE WHEN ? IS NULL THEN 0 ELSE 1 END),
                   updated_at = ?
               WHERE id = ? AND verification_status = ? AND (? IS NULL OR attempt = ?)"#,
        )
        .bind(update.new_status.as_str())
        .bind(details)
        .bind(i64::from(update.increment_retry))
        .bind(expected_attempt)
        .bind(Utc::now().to_rfc3339())
        .bind(&update.response_id)
        .bind(update.expected_status.as_str())
        .bind(expected_attempt)
        .bind(expected_attempt)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn ids_matching(&self, filter: &ResponseFilter) -> DomainResult<Vec<String>> {
        let mut query = String::from("SELECT r.id FROM responses r WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(ids) = &filter.ids {
            query.push_str(" AND r.id IN (SELECT value FROM json_each(?))");
            bindings.push(serde_json::to_string(ids)?);
        }

        if !filter.statuses.is_empty() {
            query.push_str(" AND r.verification_status IN (SELECT value FROM json_each(?))");
            bindings.push(status_list_json(&filter.statuses)?);
        }

        if !filter.difficulties.is_empty() {
            query.push_str(
                " AND r.problem_id IN (SELECT p.id FROM problems p WHERE p.difficulty IN (SELECT value FROM json_each(?)))",
            );
            bindings.push(serde_json::to_string(&filter.difficulties)?);
        }

        if let Some(after) = filter.created_after {
            query.push_str(" AND julianday(r.created_at) >= julianday(?)");
            bindings.push(after.to_rfc3339());
        }

        if let Some(before) = filter.created_before {
            query.push_str(" AND julianday(r.created_at) < julianday(?)");
            bindings.push(before.to_rfc3339());
        }

        query.push_str(" ORDER BY r.id");
        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }

        let mut q = sqlx::query_scalar::<_, String>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        Ok(q.fetch_all(&self.pool).await?)
    }

    async fn set_status_batch(
        &self,
        ids: &[String],
        status: VerificationStatus,
    ) -> DomainResult<BatchWrite> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        let mut outcome = BatchWrite::default();

        // Bumping the attempt invalidates tasks dumped before the override.
        for id in ids {
            let result = sqlx::query(
                "UPDATE responses SET verification_status = ?, attempt = attempt + 1, updated_at = ? WHERE id = ?",
            )
            .bind(status.as_str())
            .bind(&now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                outcome.missing.push(id.clone());
            } else {
                outcome.updated += result.rows_affected();
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    async fn count_by_status(&self) -> DomainResult<HashMap<VerificationStatus, u64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT verification_status, COUNT(*) AS count FROM responses GROUP BY verification_status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::new();
        for (status_str, count) in rows {
            let status = VerificationStatus::parse(&status_str)?;
            counts.insert(status, u64::try_from(count).unwrap_or_default());
        }
        Ok(counts)
    }

    async fn count_grouped(&self, grouping: ResponseGrouping) -> DomainResult<Vec<GroupCounts>> {
        let key = match grouping {
            ResponseGrouping::Model => "r.model",
            ResponseGrouping::Source => "p.source",
            ResponseGrouping::Difficulty => "p.difficulty",
        };
        let query = format!(
            r#"SELECT {key} AS group_key,
                      COUNT(*) AS total,
                      SUM(r.verification_status = 'passed') AS passed,
                      SUM(r.verification_status = 'failed') AS failed,
                      SUM(r.verification_status = 'error') AS error,
                      SUM(r.verification_status = 'pending') AS pending,
                      COUNT(DISTINCT r.problem_id) AS problems
               FROM responses r
               LEFT JOIN problems p ON p.id = r.problem_id
               GROUP BY {key}
               ORDER BY total DESC, group_key"#
        );

        let rows: Vec<GroupRow> = sqlx::query_as(&query).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(GroupCounts::from).collect())
    }
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    group_key: Option<String>,
    total: i64,
    passed: i64,
    failed: i64,
    error: i64,
    pending: i64,
    problems: i64,
}

impl From<GroupRow> for GroupCounts {
    fn from(row: GroupRow) -> Self {
        let count = |n: i64| u64::try_from(n).unwrap_or_default();
        Self {
            key: row.group_key,
            total: count(row.total),
            passed: count(row.passed),
            failed: count(row.failed),
            error: count(row.error),
            pending: count(row.pending),
            problems: count(row.problems),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ResponseRow {
    id: String,
    problem_id: String,
    model: Option<String>,
    extracted_code: Option<String>,
    verification_status: String,
    verification_details: Option<String>,
    retry_count: i64,
    attempt: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ResponseRow> for Response {
    type Error = DomainError;

    fn try_from(row: ResponseRow) -> Result<Self, Self::Error> {
        Ok(Response {
            status: VerificationStatus::parse(&row.verification_status)?,
            details: parse_json_opt(row.verification_details)?,
            retry_count: u32::try_from(row.retry_count)
                .map_err(|e| DomainError::SerializationError(e.to_string()))?,
            attempt: u32::try_from(row.attempt)
                .map_err(|e| DomainError::SerializationError(e.to_string()))?,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            id: row.id,
            problem_id: row.problem_id,
            model: row.model,
            extracted_code: row.extracted_code,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CandidateRow {
    response_id: String,
    problem_id: String,
    code: Option<String>,
    attempt: i64,
    test_cases: Option<String>,
    problem_found: bool,
}

impl From<CandidateRow> for CandidateRecord {
    fn from(row: CandidateRow) -> Self {
        Self {
            response_id: row.response_id,
            problem_id: row.problem_id,
            code: row.code,
            attempt: u32::try_from(row.attempt).unwrap_or_default(),
            test_cases: row.test_cases,
            problem_found: row.problem_found,
        }
    }
}
