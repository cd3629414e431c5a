//! Command-line interface.

pub mod commands;
pub mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use crate::adapters::sandbox::{HttpSandbox, HttpSandboxConfig};
use crate::adapters::sqlite::{database_url, initialize_database, PoolConfig, SqliteResponseRepository};
use crate::domain::models::Config;
use crate::domain::ports::{ResponseRepository, Sandbox};
use crate::infrastructure::config::ConfigLoader;

#[derive(Parser, Debug)]
#[command(name = "response-verifier")]
#[command(about = "Verify model-generated code responses in a sandbox", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this YAML file instead of .verifier/
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Verify responses online, or dump tasks / ingest results for offline runs
    Verify(commands::verify::VerifyArgs),
    /// Execute a task file without a database and write a result file
    Worker(commands::worker::WorkerArgs),
    /// Set the status of a selection of responses
    Update(commands::update::UpdateArgs),
    /// Show response counts per status
    Status(commands::status::StatusArgs),
}

impl Cli {
    /// Configuration from `--config` or the project hierarchy.
    pub fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => ConfigLoader::load_from_file(path),
            None => ConfigLoader::load(),
        }
    }
}

/// Print an error and exit with status 1.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": err.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {err:#}", console::style("error:").red().bold());
    }
    std::process::exit(1);
}

/// Open and migrate the configured database.
pub(crate) async fn open_responses(config: &Config) -> Result<Arc<dyn ResponseRepository>> {
    let url = database_url(&config.database.path);
    let pool = initialize_database(&url, PoolConfig::from(&config.database))
        .await
        .with_context(|| format!("Failed to open database {}", config.database.path))?;
    Ok(Arc::new(SqliteResponseRepository::new(pool)))
}

pub(crate) fn http_sandbox(config: &Config) -> Result<Arc<dyn Sandbox>> {
    let sandbox = HttpSandbox::new(HttpSandboxConfig::from(&config.sandbox)).context("Failed to create sandbox client")?;
    Ok(Arc::new(sandbox))
}

/// Receiver that flips to `true` on the first Ctrl-C.
pub(crate) fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, no new tasks will be started");
            let _ = tx.send(true);
        }
    });
    rx
}

/// Whether progress should be drawn on stderr.
pub(crate) fn show_progress(json_mode: bool) -> bool {
    !json_mode && console::Term::stderr().is_term()
}
