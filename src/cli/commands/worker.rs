//! Implementation of the `worker` command: offline execution of a task file.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::cli::output::progress::{create_spinner, track_events, ProgressBarExt};
use crate::cli::output::table::format_run_summary;
use crate::cli::output::{output, CommandOutput};
use crate::cli::{http_sandbox, show_progress, shutdown_on_ctrl_c};
use crate::domain::models::{Config, MatchMode, RunSummary};
use crate::services::{DispatchOptions, ExecutionSettings, OfflineWorker, SandboxClient, WorkerJob};

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Task file written by `verify --dump-tasks`
    #[arg(long, value_name = "PATH")]
    pub tasks: PathBuf,

    /// This worker's shard index
    #[arg(long, default_value = "0")]
    pub rank: u32,

    /// Number of workers sharing the task file
    #[arg(long, default_value = "1")]
    pub world_size: u32,

    /// Result file (defaults to results-RANK-WORLD.jsonl next to the task file)
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Maximum tasks in flight (defaults to verification.concurrency)
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=256))]
    pub concurrency: Option<u16>,

    /// Sandbox base URL (overrides sandbox.endpoint)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Output matching (overrides verification.worker_match)
    #[arg(long, value_parser = ["exact", "fuzzy"])]
    pub match_mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WorkerOutput {
    pub result_file: PathBuf,
    pub rank: u32,
    pub world_size: u32,
    #[serde(flatten)]
    pub summary: RunSummary,
}

impl CommandOutput for WorkerOutput {
    fn to_human(&self) -> String {
        [
            format!(
                "Shard {}/{}: {} result(s) written to {}",
                self.rank,
                self.world_size,
                self.summary.verdicts(),
                self.result_file.display()
            ),
            format_run_summary(&self.summary),
        ]
        .join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: WorkerArgs, mut config: Config, json_mode: bool) -> Result<()> {
    if let Some(endpoint) = &args.endpoint {
        config.sandbox.endpoint.clone_from(endpoint);
    }

    let job = WorkerJob {
        tasks: args.tasks,
        rank: args.rank,
        world_size: args.world_size,
        output: args.output,
    };
    job.validate()?;

    let match_mode = match args.match_mode.as_deref() {
        Some(mode) => MatchMode::from_str(mode).with_context(|| format!("Unknown match mode '{mode}'"))?,
        None => config.verification.worker_match,
    };
    let settings = ExecutionSettings {
        match_mode,
        ..ExecutionSettings::from(&config.sandbox)
    };
    let client = SandboxClient::new(http_sandbox(&config)?, settings).context("Invalid sandbox settings")?;
    let worker = OfflineWorker::new(Arc::new(client));

    let (tx, rx) = mpsc::channel(256);
    let options = DispatchOptions::new(
        args.concurrency
            .map_or(config.verification.concurrency, usize::from),
    )
    .with_shutdown(shutdown_on_ctrl_c())
    .with_events(tx);
    let bar = create_spinner(show_progress(json_mode));
    let progress = track_events(bar.clone(), rx);

    let result = worker.run(&job, &options).await;
    drop(options);
    let _ = progress.await;
    let summary = result.with_context(|| format!("Worker failed on {}", job.tasks.display()))?;

    if summary.interrupted {
        bar.finish_warning("interrupted");
    } else {
        bar.finish_success("done");
    }

    output(
        &WorkerOutput {
            result_file: job.output_path(),
            rank: job.rank,
            world_size: job.world_size,
            summary,
        },
        json_mode,
    );
    Ok(())
}
