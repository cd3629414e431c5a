//! Implementation of the `verify` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::cli::output::progress::{create_spinner, track_events, ProgressBarExt};
use crate::cli::output::table::format_run_summary;
use crate::cli::output::{output, CommandOutput};
use crate::cli::{http_sandbox, open_responses, show_progress, shutdown_on_ctrl_c};
use crate::domain::models::{Config, RunSummary};
use crate::services::{FailureLog, VerificationContext};

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Write the selected tasks to this JSONL file instead of executing them
    #[arg(long, value_name = "PATH", conflicts_with = "ingest_results")]
    pub dump_tasks: Option<PathBuf>,

    /// Reconcile results from these JSONL files instead of executing tasks
    #[arg(long, value_name = "PATH", num_args = 1..)]
    pub ingest_results: Vec<PathBuf>,

    /// Maximum tasks in flight (defaults to verification.concurrency)
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=256))]
    pub concurrency: Option<u16>,

    /// Stop after this many tasks
    #[arg(long)]
    pub limit: Option<u64>,

    /// Skip this many eligible responses first
    #[arg(long, default_value = "0")]
    pub offset: u64,

    /// Statuses to re-verify besides pending, comma-separated, or "all"
    #[arg(long, value_name = "STATUSES")]
    pub retry_status: Option<String>,

    /// Compute and report verdicts without writing them
    #[arg(long)]
    pub dryrun: bool,

    /// Append failed, errored, timed-out and unpersisted results to this JSONL file
    #[arg(long, value_name = "PATH", conflicts_with = "dump_tasks")]
    pub failure_log: Option<PathBuf>,

    /// Sandbox base URL (overrides sandbox.endpoint)
    #[arg(long)]
    pub endpoint: Option<String>,
}

impl VerifyArgs {
    fn mode(&self) -> &'static str {
        if self.dump_tasks.is_some() {
            "dump"
        } else if !self.ingest_results.is_empty() {
            "ingest"
        } else {
            "online"
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VerifyOutput {
    pub mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_file: Option<PathBuf>,
    #[serde(flatten)]
    pub summary: RunSummary,
}

impl CommandOutput for VerifyOutput {
    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        match (self.mode, &self.task_file) {
            ("dump", Some(path)) => lines.push(format!(
                "Wrote {} task(s) to {}",
                self.summary.tasks_written,
                path.display()
            )),
            _ => lines.push(format!(
                "Verified {} response(s) ({} mode{})",
                self.summary.verdicts(),
                self.mode,
                if self.summary.dryrun { ", dry run" } else { "" }
            )),
        }
        lines.push(format_run_summary(&self.summary));
        if self.summary.interrupted {
            lines.push("Interrupted: remaining responses were left untouched.".to_string());
        }
        if self.summary.has_failures() {
            lines.push(format!(
                "{} result(s) could not be persisted; see the log for ids.",
                self.summary.persistence_errors
            ));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: VerifyArgs, mut config: Config, json_mode: bool) -> Result<()> {
    if let Some(endpoint) = &args.endpoint {
        config.sandbox.endpoint.clone_from(endpoint);
    }

    let responses = open_responses(&config).await?;
    let sandbox = http_sandbox(&config)?;
    let ctx = VerificationContext::new(responses, sandbox, config).context("Invalid sandbox settings")?;

    let selection = ctx
        .selection(args.retry_status.as_deref())?
        .with_limit(args.limit)
        .with_offset(args.offset);

    let (tx, rx) = mpsc::channel(256);
    let options = ctx
        .dispatch_options(args.concurrency.map(usize::from))
        .with_shutdown(shutdown_on_ctrl_c())
        .with_events(tx);
    let bar = create_spinner(show_progress(json_mode));
    let progress = track_events(bar.clone(), rx);

    let mut dispatcher = ctx.dispatcher(args.dryrun);
    if let Some(path) = &args.failure_log {
        let log = FailureLog::create(path)
            .await
            .with_context(|| format!("Failed to create failure log {}", path.display()))?;
        dispatcher = dispatcher.with_failure_log(Arc::new(log));
    }
    let result = if let Some(path) = &args.dump_tasks {
        dispatcher.dump_tasks(&selection, path, &options).await
    } else if !args.ingest_results.is_empty() {
        dispatcher.ingest_results(&args.ingest_results, &options).await
    } else {
        dispatcher.run_online(&selection, &options).await
    };

    drop(options);
    let _ = progress.await;
    let summary = result.with_context(|| format!("Verification ({} mode) failed", args.mode()))?;

    if summary.interrupted || summary.has_failures() {
        bar.finish_warning("finished with warnings");
    } else {
        bar.finish_success("done");
    }

    let failures = summary.persistence_errors;
    output(
        &VerifyOutput {
            mode: args.mode(),
            task_file: args.dump_tasks.clone(),
            summary,
        },
        json_mode,
    );

    if failures > 0 {
        anyhow::bail!("{failures} result(s) could not be persisted");
    }
    Ok(())
}
