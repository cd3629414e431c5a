//! Dispatcher: online verification, offline task dump and result ingest.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinError, JoinSet};

use super::failure_log::FailureLog;
use super::reconciler::{tally, ReconcileOutcome, ResultReconciler};
use super::sandbox_client::SandboxClient;
use super::task_builder::{Selection, TaskBuilder};
use super::task_file::{JsonlReader, JsonlWriter, TaskFileError};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{RunSummary, Verdict, VerificationResult, VerificationTask};

/// Progress events emitted while a run is in progress.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// A result was reconciled (online or ingest)
    Reconciled {
        response_id: String,
        verdict: Verdict,
        outcome: Option<ReconcileOutcome>,
    },
    /// A task was executed by the offline worker
    Executed { response_id: String, verdict: Verdict },
    /// A task was written to the dump file
    TaskWritten { response_id: String },
    /// A line could not be decoded and was skipped
    MalformedLine { path: PathBuf, line: usize },
    /// The run stopped taking new work after a shutdown request
    Interrupted,
}

/// Options shared by every dispatch mode.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Maximum tasks in flight during online verification
    pub concurrency: usize,
    /// Set to `true` to stop pulling new work
    pub shutdown: Option<watch::Receiver<bool>>,
    pub events: Option<mpsc::Sender<DispatchEvent>>,
}

impl DispatchOptions {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            shutdown: None,
            events: None,
        }
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn with_events(mut self, events: mpsc::Sender<DispatchEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub(crate) fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    pub(crate) async fn emit(&self, event: DispatchEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}

type WorkerOutput = (VerificationResult, DomainResult<ReconcileOutcome>);

pub struct Dispatcher {
    builder: TaskBuilder,
    client: Arc<SandboxClient>,
    reconciler: Arc<ResultReconciler>,
    failure_log: Option<Arc<FailureLog>>,
}

impl Dispatcher {
    pub fn new(builder: TaskBuilder, client: Arc<SandboxClient>, reconciler: Arc<ResultReconciler>) -> Self {
        Self {
            builder,
            client,
            reconciler,
            failure_log: None,
        }
    }

    /// Record every non-passing or unpersisted result of online and ingest
    /// runs in `log`.
    pub fn with_failure_log(mut self, log: Arc<FailureLog>) -> Self {
        self.failure_log = Some(log);
        self
    }

    /// Execute every selected task with at most `options.concurrency` in
    /// flight, reconciling each result as soon as it arrives.
    pub async fn run_online(&self, selection: &Selection, options: &DispatchOptions) -> DomainResult<RunSummary> {
        let mut stream = self.builder.build(selection)?;
        let semaphore = Arc::new(Semaphore::new(options.concurrency));
        let mut workers: JoinSet<WorkerOutput> = JoinSet::new();
        let mut summary = RunSummary {
            dryrun: self.reconciler.is_dryrun(),
            ..RunSummary::default()
        };

        tracing::info!(
            sandbox = self.client.sandbox_name(),
            concurrency = options.concurrency,
            dryrun = summary.dryrun,
            "starting online verification"
        );

        let mut selection_error = None;
        loop {
            if options.shutdown_requested() {
                summary.interrupted = true;
                break;
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| DomainError::ExecutionFailed("worker pool closed".to_string()))?;

            while let Some(joined) = workers.try_join_next() {
                collect(joined, &mut summary, options, self.failure_log.as_deref()).await;
            }
            if options.shutdown_requested() {
                summary.interrupted = true;
                break;
            }

            let task = match stream.next().await {
                Ok(Some(task)) => task,
                Ok(None) => break,
                Err(err) => {
                    selection_error = Some(err);
                    break;
                }
            };

            let client = Arc::clone(&self.client);
            let reconciler = Arc::clone(&self.reconciler);
            workers.spawn(async move {
                let _permit = permit;
                let result = client.execute(&task).await;
                let outcome = reconciler.reconcile(&result).await;
                (result, outcome)
            });
        }

        if summary.interrupted {
            tracing::warn!(in_flight = workers.len(), "shutdown requested, finishing in-flight tasks");
            options.emit(DispatchEvent::Interrupted).await;
        }

        while let Some(joined) = workers.join_next().await {
            collect(joined, &mut summary, options, self.failure_log.as_deref()).await;
        }

        if let Some(err) = selection_error {
            tracing::error!(error = %err, applied = summary.applied, "task selection failed");
            return Err(err);
        }

        self.flush_failure_log().await;
        log_summary("online verification finished", &summary);
        Ok(summary)
    }

    /// Write every selected task to `path`, one JSON document per line, in
    /// selection order. Stored statuses are not touched.
    pub async fn dump_tasks(
        &self,
        selection: &Selection,
        path: &Path,
        options: &DispatchOptions,
    ) -> DomainResult<RunSummary> {
        let mut stream = self.builder.build(selection)?;
        let mut writer = JsonlWriter::<VerificationTask>::create(path).await?;
        let mut summary = RunSummary::default();

        while let Some(task) = stream.next().await? {
            if options.shutdown_requested() {
                summary.interrupted = true;
                break;
            }
            match writer.write(&task).await {
                Ok(()) => {
                    summary.tasks_written += 1;
                    options
                        .emit(DispatchEvent::TaskWritten {
                            response_id: task.response_id,
                        })
                        .await;
                }
                Err(TaskFileError::Serialize(err)) => {
                    tracing::warn!(response_id = %task.response_id, error = %err, "task not serializable, skipped");
                    summary.malformed += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
        writer.finish().await?;

        tracing::info!(path = %path.display(), tasks = summary.tasks_written, "tasks dumped");
        Ok(summary)
    }

    /// Reconcile every result in `paths`. Files are independent: an
    /// unreadable file is counted and skipped, and malformed lines are
    /// reported without stopping the file.
    pub async fn ingest_results(&self, paths: &[PathBuf], options: &DispatchOptions) -> DomainResult<RunSummary> {
        let mut summary = RunSummary {
            dryrun: self.reconciler.is_dryrun(),
            ..RunSummary::default()
        };

        for path in paths {
            let file = self.ingest_file(path, options).await;
            tracing::info!(
                path = %path.display(),
                results = file.verdicts(),
                applied = file.applied,
                malformed = file.malformed,
                "result file ingested"
            );
            summary.merge(&file);
            if summary.interrupted {
                options.emit(DispatchEvent::Interrupted).await;
                break;
            }
        }

        self.flush_failure_log().await;
        log_summary("ingest finished", &summary);
        Ok(summary)
    }

    async fn flush_failure_log(&self) {
        let Some(log) = &self.failure_log else { return };
        match log.flush().await {
            Ok(recorded) => tracing::info!(path = %log.path().display(), recorded, "failure log written"),
            Err(err) => tracing::warn!(error = %err, "failure log flush failed"),
        }
    }

    async fn ingest_file(&self, path: &Path, options: &DispatchOptions) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut reader = match JsonlReader::<VerificationResult>::open(path).await {
            Ok(reader) => reader,
            Err(err) => {
                tracing::error!(error = %err, "result file unreadable, skipped");
                summary.unreadable_files += 1;
                return summary;
            }
        };

        loop {
            if options.shutdown_requested() {
                summary.interrupted = true;
                break;
            }
            match reader.next().await {
                Ok(Some(Ok(result))) => {
                    let outcome = self.reconciler.reconcile(&result).await;
                    tally(&mut summary, &result, &outcome);
                    if let Some(log) = &self.failure_log {
                        log.record(&result, &outcome).await;
                    }
                    options
                        .emit(DispatchEvent::Reconciled {
                            response_id: result.response_id,
                            verdict: result.verdict,
                            outcome: outcome.ok(),
                        })
                        .await;
                }
                Ok(Some(Err(bad))) => {
                    tracing::warn!(path = %path.display(), line = bad.line, error = %bad.error, "malformed result line");
                    summary.malformed += 1;
                    options
                        .emit(DispatchEvent::MalformedLine {
                            path: path.to_path_buf(),
                            line: bad.line,
                        })
                        .await;
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::error!(error = %err, "result file read failed, rest of file skipped");
                    summary.unreadable_files += 1;
                    break;
                }
            }
        }
        summary
    }
}

async fn collect(
    joined: Result<WorkerOutput, JoinError>,
    summary: &mut RunSummary,
    options: &DispatchOptions,
    failure_log: Option<&FailureLog>,
) {
    match joined {
        Ok((result, outcome)) => {
            tally(summary, &result, &outcome);
            if let Some(log) = failure_log {
                log.record(&result, &outcome).await;
            }
            options
                .emit(DispatchEvent::Reconciled {
                    response_id: result.response_id,
                    verdict: result.verdict,
                    outcome: outcome.ok(),
                })
                .await;
        }
        Err(err) => {
            tracing::error!(error = %err, "verification worker failed");
            summary.worker_failures += 1;
        }
    }
}

fn log_summary(message: &str, summary: &RunSummary) {
    tracing::info!(
        passed = summary.passed,
        failed = summary.failed,
        error = summary.error,
        timeout = summary.timeout,
        skipped = summary.skipped,
        applied = summary.applied,
        unchanged = summary.unchanged,
        unknown = summary.unknown,
        malformed = summary.malformed,
        persistence_errors = summary.persistence_errors,
        interrupted = summary.interrupted,
        "{message}"
    );
}
