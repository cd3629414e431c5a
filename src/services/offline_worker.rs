//! Offline worker: executes a task file and writes a result file.
//!
//! Several workers can share one task file. Non-blank line `i` belongs to the
//! worker whose `rank == i % world_size`.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::dispatcher::{DispatchEvent, DispatchOptions};
use super::sandbox_client::SandboxClient;
use super::task_file::{shard_result_name, JsonlReader, JsonlWriter};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{MatchMode, RunSummary, VerificationResult, VerificationTask};

/// One shard of an offline run.
#[derive(Debug, Clone)]
pub struct WorkerJob {
    pub tasks: PathBuf,
    pub rank: u32,
    pub world_size: u32,
    /// Result file; `results-{rank}-{world_size}.jsonl` next to the task file when unset
    pub output: Option<PathBuf>,
}

impl WorkerJob {
    pub fn validate(&self) -> DomainResult<()> {
        if self.world_size == 0 {
            return Err(DomainError::ValidationFailed("world_size must be at least 1".to_string()));
        }
        if self.rank >= self.world_size {
            return Err(DomainError::ValidationFailed(format!(
                "rank {} is out of range for world_size {}",
                self.rank, self.world_size
            )));
        }
        Ok(())
    }

    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            self.tasks
                .with_file_name(shard_result_name(self.rank, self.world_size))
        })
    }

    fn owns(&self, index: u64) -> bool {
        index % u64::from(self.world_size) == u64::from(self.rank)
    }
}

pub struct OfflineWorker {
    client: Arc<SandboxClient>,
}

impl OfflineWorker {
    pub fn new(client: Arc<SandboxClient>) -> Self {
        Self { client }
    }

    pub fn match_mode(&self) -> MatchMode {
        self.client.match_mode()
    }

    /// Execute this shard's tasks with bounded concurrency. Results are
    /// written in completion order.
    pub async fn run(&self, job: &WorkerJob, options: &DispatchOptions) -> DomainResult<RunSummary> {
        job.validate()?;
        let output = job.output_path();
        let mut reader = JsonlReader::<VerificationTask>::open(&job.tasks).await?;
        let mut writer = JsonlWriter::<VerificationResult>::create(&output).await?;

        tracing::info!(
            tasks = %job.tasks.display(),
            output = %output.display(),
            rank = job.rank,
            world_size = job.world_size,
            matching = self.match_mode().as_str(),
            "offline worker started"
        );

        let semaphore = Arc::new(Semaphore::new(options.concurrency));
        let mut workers: JoinSet<VerificationResult> = JoinSet::new();
        let mut summary = RunSummary::default();
        let mut index: u64 = 0;

        loop {
            if options.shutdown_requested() {
                summary.interrupted = true;
                break;
            }
            let Some(line) = reader.next().await? else {
                break;
            };
            let owned = job.owns(index);
            index += 1;
            if !owned {
                continue;
            }

            let task = match line {
                Ok(task) => task,
                Err(bad) => {
                    tracing::warn!(line = bad.line, error = %bad.error, "malformed task line");
                    summary.malformed += 1;
                    continue;
                }
            };

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| DomainError::ExecutionFailed("worker pool closed".to_string()))?;
            while let Some(joined) = workers.try_join_next() {
                write_result(joined, &mut writer, &mut summary, options).await?;
            }

            let client = Arc::clone(&self.client);
            workers.spawn(async move {
                let _permit = permit;
                client.execute(&task).await
            });
        }

        while let Some(joined) = workers.join_next().await {
            write_result(joined, &mut writer, &mut summary, options).await?;
        }
        writer.finish().await?;

        tracing::info!(
            results = summary.verdicts(),
            passed = summary.passed,
            malformed = summary.malformed,
            "offline worker finished"
        );
        Ok(summary)
    }
}

async fn write_result(
    joined: Result<VerificationResult, tokio::task::JoinError>,
    writer: &mut JsonlWriter<VerificationResult>,
    summary: &mut RunSummary,
    options: &DispatchOptions,
) -> DomainResult<()> {
    match joined {
        Ok(result) => {
            summary.record_verdict(result.verdict);
            writer.write(&result).await?;
            options
                .emit(DispatchEvent::Executed {
                    response_id: result.response_id,
                    verdict: result.verdict,
                })
                .await;
            Ok(())
        }
        Err(err) => {
            tracing::error!(error = %err, "verification worker failed");
            summary.worker_failures += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sandbox::MockSandbox;
    use crate::domain::models::{TestCases, Verdict};
    use crate::services::sandbox_client::ExecutionSettings;

    fn task(id: &str) -> VerificationTask {
        VerificationTask {
            response_id: id.into(),
            problem_id: "p".into(),
            code: "print(input())".into(),
            test_cases: TestCases::stdio([("x", "x")]),
            attempt: 0,
            preamble: None,
            setup_error: None,
        }
    }

    async fn write_tasks(path: &std::path::Path, ids: &[&str]) {
        let mut writer = JsonlWriter::create(path).await.unwrap();
        for id in ids {
            writer.write(&task(id)).await.unwrap();
        }
        writer.finish().await.unwrap();
    }

    fn worker() -> OfflineWorker {
        let client = SandboxClient::new(Arc::new(MockSandbox::new()), ExecutionSettings::default()).unwrap();
        OfflineWorker::new(Arc::new(client))
    }

    #[test]
    fn test_job_validation_and_output_name() {
        let job = WorkerJob {
            tasks: PathBuf::from("/data/tasks.jsonl"),
            rank: 1,
            world_size: 4,
            output: None,
        };
        assert!(job.validate().is_ok());
        assert_eq!(job.output_path(), PathBuf::from("/data/results-000001-000004.jsonl"));

        let bad = WorkerJob { rank: 4, ..job };
        assert!(bad.validate().is_err());
    }

    #[tokio::test]
    async fn test_shards_partition_the_task_file() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = dir.path().join("tasks.jsonl");
        write_tasks(&tasks, &["a", "b", "c", "d", "e"]).await;

        let mut seen = Vec::new();
        for rank in 0..2 {
            let job = WorkerJob {
                tasks: tasks.clone(),
                rank,
                world_size: 2,
                output: None,
            };
            let summary = worker().run(&job, &DispatchOptions::new(2)).await.unwrap();
            assert_eq!(summary.passed, if rank == 0 { 3 } else { 2 });

            let mut reader = JsonlReader::<VerificationResult>::open(job.output_path()).await.unwrap();
            while let Some(line) = reader.next().await.unwrap() {
                let result = line.unwrap();
                assert_eq!(result.verdict, Verdict::Passed);
                assert_eq!(result.attempt, Some(0));
                seen.push(result.response_id);
            }
        }
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_malformed_task_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = dir.path().join("tasks.jsonl");
        write_tasks(&tasks, &["a"]).await;
        let mut content = tokio::fs::read_to_string(&tasks).await.unwrap();
        content.push_str("garbage\n");
        tokio::fs::write(&tasks, content).await.unwrap();

        let job = WorkerJob {
            tasks,
            rank: 0,
            world_size: 1,
            output: Some(dir.path().join("out.jsonl")),
        };
        let summary = worker().run(&job, &DispatchOptions::new(1)).await.unwrap();
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.malformed, 1);
    }

    #[tokio::test]
    async fn test_invalid_utf8_task_line_does_not_abort_the_shard() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = dir.path().join("tasks.jsonl");
        write_tasks(&tasks, &["a"]).await;
        let mut bytes = tokio::fs::read(&tasks).await.unwrap();
        bytes.extend_from_slice(b"{\"response_id\": \"\xff\"}\n");
        bytes.extend_from_slice(&serde_json::to_vec(&task("b")).unwrap());
        bytes.push(b'\n');
        tokio::fs::write(&tasks, bytes).await.unwrap();

        let job = WorkerJob {
            tasks,
            rank: 0,
            world_size: 1,
            output: Some(dir.path().join("out.jsonl")),
        };
        let summary = worker().run(&job, &DispatchOptions::new(1)).await.unwrap();
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.malformed, 1);
    }
}
