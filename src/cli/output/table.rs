//! Table output for CLI commands using comfy-table.

use comfy_table::{presets, Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use std::env;

use crate::domain::models::{RunSummary, VerificationStatus};
use crate::domain::ports::GroupCounts;

/// Table of response counts per status, with a total row.
pub fn format_status_counts(counts: &[(VerificationStatus, u64)]) -> String {
    let use_colors = supports_color();
    let mut table = base_table();
    table.set_header(vec![
        Cell::new("Status").add_attribute(Attribute::Bold),
        Cell::new("Responses").add_attribute(Attribute::Bold),
    ]);

    for (status, count) in counts {
        let status_cell = if use_colors {
            Cell::new(status.as_str()).fg(status_color(*status))
        } else {
            Cell::new(status.as_str())
        };
        table.add_row(vec![status_cell, Cell::new(count).set_alignment(CellAlignment::Right)]);
    }

    let total: u64 = counts.iter().map(|(_, count)| count).sum();
    table.add_row(vec![
        Cell::new("total").add_attribute(Attribute::Bold),
        Cell::new(total)
            .set_alignment(CellAlignment::Right)
            .add_attribute(Attribute::Bold),
    ]);
    table.to_string()
}

/// Two-column table of the non-zero counters of a run.
pub fn format_run_summary(summary: &RunSummary) -> String {
    let mut table = base_table();
    table.set_header(vec![
        Cell::new("Outcome").add_attribute(Attribute::Bold),
        Cell::new("Count").add_attribute(Attribute::Bold),
    ]);

    let rows = [
        ("passed", summary.passed),
        ("failed", summary.failed),
        ("error", summary.error),
        ("timeout", summary.timeout),
        ("skipped", summary.skipped),
        ("applied", summary.applied),
        ("unchanged", summary.unchanged),
        ("unknown id", summary.unknown),
        ("malformed", summary.malformed),
        ("persistence errors", summary.persistence_errors),
        ("worker failures", summary.worker_failures),
        ("unreadable files", summary.unreadable_files),
        ("tasks written", summary.tasks_written),
    ];
    for (label, count) in rows.into_iter().filter(|(_, count)| *count > 0) {
        let mut cell = Cell::new(count).set_alignment(CellAlignment::Right);
        if label == "persistence errors" && supports_color() {
            cell = cell.fg(Color::Red);
        }
        table.add_row(vec![Cell::new(label), cell]);
    }
    table.to_string()
}

/// Per-group counts with the pass rate among verified responses.
pub fn format_group_counts(label: &str, groups: &[GroupCounts]) -> String {
    let mut table = base_table();
    let header = [label, "Total", "Passed", "Failed", "Error", "Pending", "Problems", "Pass rate"];
    table.set_header(
        header
            .iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect::<Vec<_>>(),
    );

    for group in groups {
        let verified = group.passed + group.failed + group.error;
        let rate = if verified == 0 {
            "-".to_string()
        } else {
            format!("{:.1}%", percent(group.passed, verified))
        };
        let mut row = vec![Cell::new(group.key.as_deref().unwrap_or("(none)"))];
        row.extend(
            [group.total, group.passed, group.failed, group.error, group.pending, group.problems]
                .into_iter()
                .map(|n| Cell::new(n).set_alignment(CellAlignment::Right)),
        );
        row.push(Cell::new(rate).set_alignment(CellAlignment::Right));
        table.add_row(row);
    }
    table.to_string()
}

#[allow(clippy::cast_precision_loss)]
pub fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

fn base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Check if color output is supported
fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

fn status_color(status: VerificationStatus) -> Color {
    match status {
        VerificationStatus::Passed => Color::Green,
        VerificationStatus::Failed => Color::Red,
        VerificationStatus::Error => Color::Yellow,
        VerificationStatus::Pending => Color::White,
        VerificationStatus::Skipped => Color::DarkGrey,
    }
}
