//! Progress display using indicatif.
//!
//! Runs have no known total (selection is streamed), so progress is a
//! spinner whose message carries running verdict counts.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::models::RunSummary;
use crate::services::DispatchEvent;

const SPINNER_TEMPLATE: &str = "[{elapsed_precise}] {spinner:.green} {pos} {msg}";
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Create a spinner for a streamed run. Hidden when `visible` is false so
/// JSON output and non-terminal stderr stay clean.
pub fn create_spinner(visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden());
    }
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template(SPINNER_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(SPINNER_CHARS);
    spinner.set_style(style);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Extension trait for ProgressBar to add common utility methods
pub trait ProgressBarExt {
    /// Finish with a success message (green checkmark)
    fn finish_success(&self, message: impl Into<String>);

    /// Finish with a warning message (yellow !)
    fn finish_warning(&self, message: impl Into<String>);
}

impl ProgressBarExt for ProgressBar {
    fn finish_success(&self, message: impl Into<String>) {
        self.finish_with_message(format!("✓ {}", message.into()));
    }

    fn finish_warning(&self, message: impl Into<String>) {
        self.finish_with_message(format!("! {}", message.into()));
    }
}

/// Drive `bar` from dispatch events until the sender side is dropped.
pub fn track_events(bar: ProgressBar, mut events: mpsc::Receiver<DispatchEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tally = RunSummary::default();
        while let Some(event) = events.recv().await {
            match event {
                DispatchEvent::Reconciled { verdict, .. } | DispatchEvent::Executed { verdict, .. } => {
                    tally.record_verdict(verdict);
                    bar.inc(1);
                    bar.set_message(verdict_line(&tally));
                }
                DispatchEvent::TaskWritten { .. } => {
                    bar.inc(1);
                    bar.set_message("tasks written");
                }
                DispatchEvent::MalformedLine { path, line } => {
                    bar.println(format!("skipped malformed line {line} in {}", path.display()));
                }
                DispatchEvent::Interrupted => {
                    bar.set_message("interrupted, finishing in-flight tasks");
                }
            }
        }
    })
}

fn verdict_line(tally: &RunSummary) -> String {
    format!(
        "passed {} | failed {} | error {} | timeout {} | skipped {}",
        tally.passed, tally.failed, tally.error, tally.timeout, tally.skipped
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Verdict;

    #[tokio::test]
    async fn test_track_events_counts_verdicts() {
        let bar = create_spinner(false);
        let (tx, rx) = mpsc::channel(8);
        let handle = track_events(bar.clone(), rx);

        for verdict in [Verdict::Passed, Verdict::Failed, Verdict::Passed] {
            tx.send(DispatchEvent::Reconciled {
                response_id: "r".into(),
                verdict,
                outcome: None,
            })
            .await
            .unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        assert_eq!(bar.position(), 3);
        assert!(bar.message().starts_with("passed 2 | failed 1"));
    }
}
