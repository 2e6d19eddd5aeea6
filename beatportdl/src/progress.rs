//! Per-track progress display.
//!
//! Transfers only write their [`TransferProgress`] counters; a sampling task
//! per track renders them as an `indicatif` bar. With the display disabled,
//! start and finish lines are logged instead.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::task::JoinHandle;
use tracing::info;
use transfer_engine::TransferProgress;

const SAMPLE_INTERVAL: Duration = Duration::from_millis(150);

#[derive(Debug, Clone)]
pub struct ProgressDisplay {
    multi: Option<MultiProgress>,
}

impl ProgressDisplay {
    pub fn new(enabled: bool) -> Self {
        Self {
            multi: enabled.then(MultiProgress::new),
        }
    }

    /// A display that renders nothing and logs nothing extra.
    pub fn hidden() -> Self {
        Self {
            multi: Some(MultiProgress::with_draw_target(ProgressDrawTarget::hidden())),
        }
    }

    /// The bar container, for console output that must not tear the bars.
    pub fn multi(&self) -> Option<MultiProgress> {
        self.multi.clone()
    }

    /// Start showing `progress` under `label`.
    pub fn track(&self, label: &str, progress: Arc<TransferProgress>) -> TrackProgress {
        let Some(multi) = &self.multi else {
            info!(track = %label, "Downloading");
            return TrackProgress {
                label: label.to_string(),
                bar: None,
                sampler: None,
            };
        };

        let bar = multi.add(ProgressBar::new(0));
        bar.set_style(bar_style());
        bar.set_message(label.to_string());

        let sampler = {
            let bar = bar.clone();
            tokio::spawn(async move {
                loop {
                    let snapshot = progress.snapshot();
                    let (position, length) = snapshot.position();
                    if snapshot.total_segments > 0 {
                        bar.set_prefix("segments");
                    }
                    bar.set_length(length);
                    bar.set_position(position);
                    if snapshot.finished {
                        break;
                    }
                    tokio::time::sleep(SAMPLE_INTERVAL).await;
                }
            })
        };

        TrackProgress {
            label: label.to_string(),
            bar: Some(bar),
            sampler: Some(sampler),
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.yellow} [{bar:20.yellow/white}] {percent:>3}% {prefix} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ")
}

/// Display handle of one track. Dropping it without [`TrackProgress::finish`]
/// clears the bar.
pub struct TrackProgress {
    label: String,
    bar: Option<ProgressBar>,
    sampler: Option<JoinHandle<()>>,
}

impl TrackProgress {
    /// Remove the bar and report the outcome of the track.
    pub fn finish(mut self, bytes: Option<u64>) {
        let log_lines = self.bar.is_none();
        self.stop();
        if log_lines && let Some(bytes) = bytes {
            info!(track = %self.label, size = %HumanBytes(bytes), "Downloaded");
        }
    }

    fn stop(&mut self) {
        if let Some(sampler) = self.sampler.take() {
            sampler.abort();
        }
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl Drop for TrackProgress {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hidden_display_samples_until_finished() {
        let display = ProgressDisplay::hidden();
        let progress = Arc::new(TransferProgress::new());
        let handle = display.track("007. Strobe", progress.clone());

        progress.set_total_segments(3);
        progress.segment_completed();
        progress.finish();
        handle.finish(Some(1024));
    }

    #[tokio::test]
    async fn test_disabled_display_has_no_bars() {
        let display = ProgressDisplay::new(false);
        assert!(display.multi().is_none());
        let handle = display.track("a", Arc::new(TransferProgress::new()));
        assert!(handle.bar.is_none());
        handle.finish(None);
    }
}
