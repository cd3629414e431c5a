//! Implementation of the `status` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::cli::open_responses;
use crate::cli::output::table::{format_group_counts, format_status_counts, percent};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, VerificationStatus};
use crate::domain::ports::{GroupCounts, ResponseGrouping};
use crate::services::StatusLedger;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Also break counts down by these dimensions (comma-separated)
    #[arg(long, value_delimiter = ',', value_parser = ["model", "source", "difficulty"])]
    pub by: Vec<String>,

    /// Print the ids of responses in this status instead of counts
    #[arg(long, value_name = "STATUS", conflicts_with = "by")]
    pub list_ids: Option<String>,

    /// Print at most this many ids
    #[arg(long, requires = "list_ids")]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct StatusOutput {
    #[serde(skip)]
    pub counts: Vec<(VerificationStatus, u64)>,
    pub by_status: BTreeMap<&'static str, u64>,
    pub total: u64,
    /// Percentage of passed responses among passed, failed and error
    pub pass_rate: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub breakdowns: Vec<Breakdown>,
}

#[derive(Debug, Serialize)]
pub struct Breakdown {
    pub by: ResponseGrouping,
    pub groups: Vec<GroupCounts>,
}

impl StatusOutput {
    pub fn new(counts: Vec<(VerificationStatus, u64)>) -> Self {
        let by_status = counts.iter().map(|(status, n)| (status.as_str(), *n)).collect();
        let total = counts.iter().map(|(_, n)| n).sum();
        let count = |wanted: VerificationStatus| {
            counts
                .iter()
                .find(|(status, _)| *status == wanted)
                .map_or(0, |(_, n)| *n)
        };
        let passed = count(VerificationStatus::Passed);
        let verified = passed + count(VerificationStatus::Failed) + count(VerificationStatus::Error);
        let pass_rate = (verified > 0).then(|| percent(passed, verified));
        Self {
            counts,
            by_status,
            total,
            pass_rate,
            breakdowns: Vec::new(),
        }
    }

    pub fn with_breakdown(mut self, by: ResponseGrouping, groups: Vec<GroupCounts>) -> Self {
        self.breakdowns.push(Breakdown { by, groups });
        self
    }
}

impl CommandOutput for StatusOutput {
    fn to_human(&self) -> String {
        if self.total == 0 {
            return "No responses stored.".to_string();
        }
        let mut sections = vec![format_status_counts(&self.counts)];
        if let Some(rate) = self.pass_rate {
            sections.push(format!("Pass rate (verified responses): {rate:.1}%"));
        }
        for breakdown in &self.breakdowns {
            let label = match breakdown.by {
                ResponseGrouping::Model => "Model",
                ResponseGrouping::Source => "Source",
                ResponseGrouping::Difficulty => "Difficulty",
            };
            sections.push(format!("\nBy {}:", breakdown.by.as_str()));
            sections.push(format_group_counts(label, &breakdown.groups));
        }
        sections.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct IdListOutput {
    pub status: VerificationStatus,
    pub ids: Vec<String>,
}

impl CommandOutput for IdListOutput {
    fn to_human(&self) -> String {
        if self.ids.is_empty() {
            return format!("No responses with status {}.", self.status);
        }
        self.ids.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: StatusArgs, config: Config, json_mode: bool) -> Result<()> {
    let ledger = StatusLedger::new(open_responses(&config).await?);

    if let Some(status) = &args.list_ids {
        let status = VerificationStatus::parse(status)?;
        let ids = ledger
            .ids_with_status(status, args.limit)
            .await
            .with_context(|| format!("Failed to list {status} responses"))?;
        output(&IdListOutput { status, ids }, json_mode);
        return Ok(());
    }

    let mut out = StatusOutput::new(ledger.counts().await?);
    for name in &args.by {
        let Some(grouping) = ResponseGrouping::from_str(name) else {
            continue;
        };
        let groups = ledger
            .breakdown(grouping)
            .await
            .with_context(|| format!("Failed to count responses by {name}"))?;
        out = out.with_breakdown(grouping, groups);
    }
    output(&out, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_output_json() {
        let out = StatusOutput::new(vec![
            (VerificationStatus::Pending, 2),
            (VerificationStatus::Passed, 1),
        ]);
        let json = out.to_json();
        assert_eq!(json["total"], 3);
        assert_eq!(json["by_status"]["pending"], 2);
        assert_eq!(json["pass_rate"], 100.0);
        assert!(json.get("counts").is_none());
        assert!(json.get("breakdowns").is_none());
    }

    #[test]
    fn test_pass_rate_ignores_pending_and_skipped() {
        let out = StatusOutput::new(vec![
            (VerificationStatus::Pending, 10),
            (VerificationStatus::Passed, 1),
            (VerificationStatus::Failed, 2),
            (VerificationStatus::Error, 1),
            (VerificationStatus::Skipped, 6),
        ]);
        assert_eq!(out.pass_rate, Some(25.0));

        let untouched = StatusOutput::new(vec![(VerificationStatus::Pending, 3)]);
        assert_eq!(untouched.pass_rate, None);
        assert!(!untouched.to_human().contains("Pass rate"));
    }

    #[test]
    fn test_breakdown_is_rendered_and_serialized() {
        let out = StatusOutput::new(vec![(VerificationStatus::Passed, 2)]).with_breakdown(
            ResponseGrouping::Difficulty,
            vec![GroupCounts {
                key: Some("hard".into()),
                total: 2,
                passed: 2,
                problems: 1,
                ..GroupCounts::default()
            }],
        );
        assert!(out.to_human().contains("By difficulty:"));
        let json = out.to_json();
        assert_eq!(json["breakdowns"][0]["by"], "difficulty");
        assert_eq!(json["breakdowns"][0]["groups"][0]["key"], "hard");
    }

    #[test]
    fn test_id_list_output() {
        let out = IdListOutput {
            status: VerificationStatus::Failed,
            ids: vec!["r1".into(), "r2".into()],
        };
        assert_eq!(out.to_human(), "r1\nr2");
        assert_eq!(out.to_json()["status"], "failed");
    }
}
