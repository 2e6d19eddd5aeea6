//! Per-track outcomes and their batch-wide tally.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::PipelineError;

#[derive(Debug)]
pub enum TrackOutcome {
    /// Placed in the downloads tree.
    Completed(PathBuf),
    /// Delivered only; nothing kept on disk.
    Delivered,
    /// The final file already exists.
    Skipped(PathBuf),
    /// The same output was already in flight.
    DroppedDuplicate,
    Failed(PipelineError),
}

impl TrackOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Outcome counters of one batch, shared by its units.
#[derive(Debug, Default)]
pub struct Tally {
    completed: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    duplicates: AtomicUsize,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, outcome: &TrackOutcome) {
        let counter = match outcome {
            TrackOutcome::Completed(_) | TrackOutcome::Delivered => &self.completed,
            TrackOutcome::Skipped(_) => &self.skipped,
            TrackOutcome::DroppedDuplicate => &self.duplicates,
            TrackOutcome::Failed(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failure that happened before any track pipeline started.
    pub fn count_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self) -> BatchReport {
        BatchReport {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duplicates: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.skipped + self.duplicates
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.completed += other.completed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.duplicates += other.duplicates;
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} completed, {} failed, {} skipped, {} duplicates",
            self.completed, self.failed, self.skipped, self.duplicates
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Step};

    #[test]
    fn test_tally_counts_each_outcome() {
        let tally = Tally::new();
        tally.count(&TrackOutcome::Completed(PathBuf::from("a.flac")));
        tally.count(&TrackOutcome::Delivered);
        tally.count(&TrackOutcome::Skipped(PathBuf::from("b.flac")));
        tally.count(&TrackOutcome::DroppedDuplicate);
        tally.count(&TrackOutcome::Failed(PipelineError::new(
            Step::Tag,
            Error::Other("x".to_string()),
        )));
        tally.count_failure();

        let report = tally.report();
        assert_eq!(
            report,
            BatchReport {
                completed: 2,
                failed: 2,
                skipped: 1,
                duplicates: 1,
            }
        );
        assert_eq!(report.total(), 6);
        assert_eq!(
            report.to_string(),
            "2 completed, 2 failed, 1 skipped, 1 duplicates"
        );
    }
}
