//! Run summary counters.

use serde::{Deserialize, Serialize};

use super::status::Verdict;

/// Per-run counters reported by every dispatch mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub passed: u64,
    pub failed: u64,
    pub error: u64,
    pub timeout: u64,
    pub skipped: u64,
    /// Results written to the store
    pub applied: u64,
    /// Results that changed nothing (terminal or stale)
    pub unchanged: u64,
    /// Results naming a response that does not exist
    pub unknown: u64,
    /// Unparseable lines in task or result files
    pub malformed: u64,
    pub persistence_errors: u64,
    /// Workers that panicked or were aborted
    pub worker_failures: u64,
    pub unreadable_files: u64,
    /// Tasks written by an offline dump
    pub tasks_written: u64,
    pub interrupted: bool,
    pub dryrun: bool,
}

impl RunSummary {
    pub fn record_verdict(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Passed => self.passed += 1,
            Verdict::Failed => self.failed += 1,
            Verdict::Error => self.error += 1,
            Verdict::Timeout => self.timeout += 1,
            Verdict::Skipped => self.skipped += 1,
        }
    }

    /// Number of results observed, by verdict.
    pub fn verdicts(&self) -> u64 {
        self.passed + self.failed + self.error + self.timeout + self.skipped
    }

    /// Whether the run ended with anything that needs operator attention.
    pub fn has_failures(&self) -> bool {
        self.persistence_errors > 0
    }

    pub fn merge(&mut self, other: &Self) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.error += other.error;
        self.timeout += other.timeout;
        self.skipped += other.skipped;
        self.applied += other.applied;
        self.unchanged += other.unchanged;
        self.unknown += other.unknown;
        self.malformed += other.malformed;
        self.persistence_errors += other.persistence_errors;
        self.worker_failures += other.worker_failures;
        self.unreadable_files += other.unreadable_files;
        self.tasks_written += other.tasks_written;
        self.interrupted |= other.interrupted;
        self.dryrun |= other.dryrun;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_merge() {
        let mut a = RunSummary::default();
        a.record_verdict(Verdict::Passed);
        a.record_verdict(Verdict::Timeout);
        a.applied = 2;

        let mut b = RunSummary::default();
        b.record_verdict(Verdict::Failed);
        b.persistence_errors = 1;
        b.interrupted = true;

        a.merge(&b);
        assert_eq!(a.verdicts(), 3);
        assert_eq!(a.timeout, 1);
        assert!(a.interrupted);
        assert!(a.has_failures());
    }
}
