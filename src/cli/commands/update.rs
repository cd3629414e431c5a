//! Implementation of the `update` command: bulk status changes.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::open_responses;
use crate::cli::output::{output, truncate, CommandOutput};
use crate::domain::models::{Config, VerificationStatus};
use crate::domain::ports::ResponseFilter;
use crate::services::{read_id_list, BatchUpdateReport, BulkUpdate, StatusLedger};

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Status to set
    #[arg(long)]
    pub status: String,

    /// File of response ids: one id, JSON string, or JSON object with "id" per line
    #[arg(long, value_name = "PATH")]
    pub ids_file: Option<PathBuf>,

    /// Only responses currently in one of these statuses (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub current_status: Vec<String>,

    /// Only responses to problems of these difficulties (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub difficulty: Vec<String>,

    /// Only responses created at or after this time (RFC 3339 or YYYY-MM-DD, UTC)
    #[arg(long, value_name = "TIME", value_parser = parse_timestamp)]
    pub after: Option<DateTime<Utc>>,

    /// Only responses created before this time (RFC 3339 or YYYY-MM-DD, UTC)
    #[arg(long, value_name = "TIME", value_parser = parse_timestamp)]
    pub before: Option<DateTime<Utc>>,

    /// Update at most this many responses
    #[arg(long)]
    pub limit: Option<u32>,

    /// Report the selection without writing
    #[arg(long)]
    pub dryrun: bool,
}

#[derive(Debug, Serialize)]
pub struct UpdateOutput {
    pub target: VerificationStatus,
    #[serde(flatten)]
    pub report: BatchUpdateReport,
}

impl CommandOutput for UpdateOutput {
    fn to_human(&self) -> String {
        let report = &self.report;
        if report.dryrun {
            return format!(
                "Dry run: {} response(s) would be set to {}",
                report.selected, self.target
            );
        }

        let mut lines = vec![format!(
            "Set {} of {} selected response(s) to {} in {} batch(es)",
            report.updated, report.selected, self.target, report.chunks_committed
        )];
        if !report.missing.is_empty() {
            lines.push(format!(
                "{} id(s) not found: {}",
                report.missing.len(),
                truncate(&report.missing.join(", "), 200)
            ));
        }
        if let Some(failure) = &report.failure {
            lines.push(format!(
                "Stopped after a failed batch ({}); {} id(s) not applied",
                failure.reason,
                failure.unapplied.len()
            ));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Parse an RFC 3339 timestamp, a naive `YYYY-MM-DDTHH:MM:SS` (taken as
/// UTC) or a bare date (midnight UTC).
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("invalid time '{value}': expected RFC 3339 or YYYY-MM-DD"))
}

pub async fn execute(args: UpdateArgs, config: Config, json_mode: bool) -> Result<()> {
    let target = VerificationStatus::parse(&args.status)?;
    let statuses = args
        .current_status
        .iter()
        .map(|s| VerificationStatus::parse(s))
        .collect::<Result<Vec<_>, _>>()?;
    let ids = match &args.ids_file {
        Some(path) => Some(
            read_id_list(path)
                .await
                .with_context(|| format!("Failed to read id list {}", path.display()))?,
        ),
        None => None,
    };

    let request = BulkUpdate {
        filter: ResponseFilter {
            ids,
            statuses,
            difficulties: args.difficulty,
            created_after: args.after,
            created_before: args.before,
            limit: args.limit,
        },
        target,
        dryrun: args.dryrun,
    };

    let ledger = StatusLedger::new(open_responses(&config).await?);
    let report = ledger.bulk_update(&request).await?;
    let check = report.check();

    output(&UpdateOutput { target, report }, json_mode);
    check?;
    Ok(())
}
