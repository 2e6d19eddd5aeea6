//! Pipeline orchestrator.
//!
//! One [`Orchestrator`] serves a whole run. Link handlers fan out into one
//! unit per track; each unit drives
//! `admit -> resolve -> name -> claim -> acquire -> tag -> deliver -> place`
//! with every temp artifact owned by a guard, so any failing step leaves
//! nothing behind.

mod layout;
mod links;
pub mod outcome;
mod track;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use catalog::{Catalog, Store, Track};
use tracing::{error, info};
use transfer_engine::ByteSource;

use crate::acquisition::{AcquisitionSelector, Quality};
use crate::config::AppConfig;
use crate::delivery::Delivery;
use crate::error::PipelineError;
use crate::governor::{Batch, Governor};
use crate::media::{Remuxer, TagWriter};
use crate::progress::ProgressDisplay;
use crate::tagging::CoverPolicy;
use crate::{Error, Result};

pub use outcome::{BatchReport, Tally, TrackOutcome};

/// External collaborators of the orchestrator.
pub struct Collaborators {
    pub catalogs: HashMap<Store, Arc<dyn Catalog>>,
    pub source: Arc<dyn ByteSource>,
    pub remuxer: Arc<dyn Remuxer>,
    pub tag_writer: Arc<dyn TagWriter>,
    pub delivery: Option<Arc<dyn Delivery>>,
    pub progress: ProgressDisplay,
}

pub struct Orchestrator {
    config: Arc<AppConfig>,
    quality: Quality,
    governor: Governor,
    selector: AcquisitionSelector,
    covers: CoverPolicy,
    catalogs: HashMap<Store, Arc<dyn Catalog>>,
    tag_writer: Arc<dyn TagWriter>,
    delivery: Option<Arc<dyn Delivery>>,
    progress: ProgressDisplay,
}

impl Orchestrator {
    pub fn new(config: Arc<AppConfig>, parts: Collaborators) -> Result<Self> {
        let quality = config.quality()?;
        let governor = Governor::new(
            config.concurrency.max_global_workers,
            config.concurrency.max_download_workers,
        );
        let selector = AcquisitionSelector::new(
            parts.source,
            parts.remuxer,
            config.transfer_config(),
            governor.clone(),
        );
        Ok(Self {
            covers: CoverPolicy::from_config(&config, quality),
            config,
            quality,
            governor,
            selector,
            catalogs: parts.catalogs,
            tag_writer: parts.tag_writer,
            delivery: parts.delivery,
            progress: parts.progress,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn governor(&self) -> &Governor {
        &self.governor
    }

    pub fn delivery(&self) -> Option<&Arc<dyn Delivery>> {
        self.delivery.as_ref()
    }

    fn catalog(&self, store: Store) -> Result<Arc<dyn Catalog>> {
        self.catalogs
            .get(&store)
            .cloned()
            .ok_or_else(|| Error::config(format!("no {store} credentials configured")))
    }

    fn downloads_root(&self) -> PathBuf {
        self.config.general.downloads_directory.clone()
    }
}

/// State shared by every unit of one batch.
#[derive(Clone)]
pub struct RunContext {
    pub batch: Batch,
    pub tally: Arc<Tally>,
    /// Chat that requested the batch, if any; finished files are sent there.
    pub chat_id: Option<i64>,
    /// Link being processed, for log context.
    pub url: Arc<str>,
}

impl RunContext {
    pub fn new(batch: Batch, tally: Arc<Tally>, chat_id: Option<i64>, url: &str) -> Self {
        Self {
            batch,
            tally,
            chat_id,
            url: Arc::from(url),
        }
    }

    /// Count and log the outcome of `track`. Returns whether it failed.
    fn record(&self, track: &Track, outcome: TrackOutcome) -> bool {
        self.tally.count(&outcome);
        match &outcome {
            TrackOutcome::Completed(path) => {
                info!(url = %self.url, track_id = track.id, path = %path.display(), "Track completed")
            }
            TrackOutcome::Delivered => {
                info!(url = %self.url, track_id = track.id, "Track delivered")
            }
            TrackOutcome::Skipped(path) => {
                info!(url = %self.url, track_id = track.id, path = %path.display(), "Track already exists, skipping")
            }
            TrackOutcome::DroppedDuplicate => {
                info!(url = %self.url, track_id = track.id, "Duplicate track request dropped")
            }
            TrackOutcome::Failed(e) => self.log_failure(Some(track.id), e),
        }
        outcome.is_failed()
    }

    fn fail(&self, track_id: Option<u64>, e: &PipelineError) {
        self.tally.count_failure();
        self.log_failure(track_id, e);
    }

    fn log_failure(&self, track_id: Option<u64>, e: &PipelineError) {
        match track_id {
            Some(track_id) => {
                error!(url = %self.url, track_id, step = %e.step, error = %e.source, "Track failed")
            }
            None => error!(url = %self.url, step = %e.step, error = %e.source, "Link failed"),
        }
    }
}
