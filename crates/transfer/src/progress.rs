//! Transfer progress counters.
//!
//! Written only by the transfer that owns them, sampled by display code.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct TransferProgress {
    total_bytes: AtomicU64,
    received_bytes: AtomicU64,
    total_segments: AtomicU64,
    completed_segments: AtomicU64,
    finished: AtomicBool,
}

/// Point-in-time copy of a [`TransferProgress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    /// Zero when the size is unknown.
    pub total_bytes: u64,
    pub received_bytes: u64,
    pub total_segments: u64,
    pub completed_segments: u64,
    pub finished: bool,
}

impl TransferProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_total_bytes(&self, total: u64) {
        self.total_bytes.store(total, Ordering::Relaxed);
    }

    pub fn add_received(&self, bytes: u64) {
        self.received_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn set_total_segments(&self, total: u64) {
        self.total_segments.store(total, Ordering::Relaxed);
    }

    pub fn segment_completed(&self) {
        self.completed_segments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            received_bytes: self.received_bytes.load(Ordering::Relaxed),
            total_segments: self.total_segments.load(Ordering::Relaxed),
            completed_segments: self.completed_segments.load(Ordering::Relaxed),
            finished: self.finished.load(Ordering::Acquire),
        }
    }
}

impl ProgressSnapshot {
    /// Progress position and length for display: segments for segmented
    /// transfers, bytes otherwise.
    pub fn position(&self) -> (u64, u64) {
        if self.total_segments > 0 {
            (self.completed_segments, self.total_segments)
        } else {
            (self.received_bytes, self.total_bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_prefers_segments() {
        let progress = TransferProgress::new();
        progress.set_total_bytes(100);
        progress.add_received(40);
        assert_eq!(progress.snapshot().position(), (40, 100));

        progress.set_total_segments(3);
        progress.segment_completed();
        let snapshot = progress.snapshot();
        assert_eq!(snapshot.position(), (1, 3));
        assert!(!snapshot.finished);

        progress.finish();
        assert!(progress.snapshot().finished);
    }
}
