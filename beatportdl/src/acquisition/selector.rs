//! Acquisition selector: decides the transfer strategy for a track and
//! drives the transfer into a temp file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use catalog::Catalog;
use tracing::{debug, info};
use transfer_engine::{ByteSource, SegmentedTransfer, TransferConfig, TransferProgress};

use super::quality::{MediaSignature, Quality};
use crate::error::{PipelineError, Step, StepExt};
use crate::governor::Governor;
use crate::media::Remuxer;
use crate::utils::fs::TempArtifact;
use crate::{Error, Result};

/// How the bits of a track are fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStrategy {
    /// One progressive download of a signed location.
    Direct { url: String },
    /// A segmented stream reassembled and remuxed locally.
    Segmented { manifest_url: String },
}

/// A resolved acquisition: what will be written and from where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub quality: Quality,
    pub signature: MediaSignature,
    pub strategy: TransferStrategy,
}

impl TransferPlan {
    pub fn extension(&self) -> &'static str {
        self.signature.extension()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Unresolved,
    DirectDownload,
    SegmentedStream,
    Acquired,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unresolved => "unresolved",
            Self::DirectDownload => "direct_download",
            Self::SegmentedStream => "segmented_stream",
            Self::Acquired => "acquired",
            Self::Failed => "failed",
        }
    }

    fn can_transition_to(&self, to: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, to),
            (Unresolved, DirectDownload | SegmentedStream | Failed)
                | (DirectDownload | SegmentedStream, Acquired | Failed)
        )
    }
}

/// One track acquisition. Owned by the pipeline invocation that created it;
/// only the progress counter is shared (with the display).
#[derive(Debug)]
pub struct TransferJob {
    pub track_id: u64,
    pub quality: Quality,
    state: JobState,
    plan: Option<TransferPlan>,
    progress: Arc<TransferProgress>,
}

impl TransferJob {
    pub fn new(track_id: u64, quality: Quality) -> Self {
        Self {
            track_id,
            quality,
            state: JobState::Unresolved,
            plan: None,
            progress: Arc::new(TransferProgress::new()),
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn plan(&self) -> Option<&TransferPlan> {
        self.plan.as_ref()
    }

    pub fn progress(&self) -> Arc<TransferProgress> {
        self.progress.clone()
    }

    fn transition(&mut self, to: JobState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(Error::InvalidStateTransition {
                from: self.state.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        debug!(track_id = self.track_id, from = self.state.as_str(), to = to.as_str(), "transfer job state");
        self.state = to;
        Ok(())
    }

    /// Record the resolved plan and enter its transfer state.
    pub fn resolved(&mut self, plan: TransferPlan) -> Result<()> {
        let next = match plan.strategy {
            TransferStrategy::Direct { .. } => JobState::DirectDownload,
            TransferStrategy::Segmented { .. } => JobState::SegmentedStream,
        };
        self.transition(next)?;
        self.plan = Some(plan);
        Ok(())
    }

    pub fn fail(&mut self) {
        if self.state.can_transition_to(JobState::Failed) {
            self.state = JobState::Failed;
        }
    }
}

/// Chooses and runs the transfer for a track.
pub struct AcquisitionSelector {
    source: Arc<dyn ByteSource>,
    remuxer: Arc<dyn Remuxer>,
    transfer_config: TransferConfig,
    governor: Governor,
}

impl AcquisitionSelector {
    pub fn new(
        source: Arc<dyn ByteSource>,
        remuxer: Arc<dyn Remuxer>,
        transfer_config: TransferConfig,
        governor: Governor,
    ) -> Self {
        Self {
            source,
            remuxer,
            transfer_config,
            governor,
        }
    }

    /// Resolve the plan for `job` against the catalog.
    pub async fn resolve(
        &self,
        catalog: &dyn Catalog,
        job: &mut TransferJob,
    ) -> std::result::Result<TransferPlan, PipelineError> {
        let plan = match self.plan(catalog, job.track_id, job.quality).await {
            Ok(plan) => plan,
            Err(e) => {
                job.fail();
                return Err(PipelineError::new(Step::Resolve, e));
            }
        };
        job.resolved(plan.clone()).at_step(Step::Resolve)?;
        Ok(plan)
    }

    async fn plan(&self, catalog: &dyn Catalog, track_id: u64, quality: Quality) -> Result<TransferPlan> {
        if quality.is_segmented() {
            let manifest_url = catalog.stream_manifest(track_id).await?;
            return Ok(TransferPlan {
                quality,
                signature: MediaSignature::Aac128Hls,
                strategy: TransferStrategy::Segmented { manifest_url },
            });
        }
        let descriptor = catalog.download_descriptor(track_id, quality.as_str()).await?;
        let signature = MediaSignature::classify(&descriptor.signature)?;
        Ok(TransferPlan {
            quality,
            signature,
            strategy: TransferStrategy::Direct {
                url: descriptor.location,
            },
        })
    }

    /// Run the resolved transfer of `job` into `dest`.
    ///
    /// On failure nothing created here is left on disk.
    pub async fn acquire(
        &self,
        job: &mut TransferJob,
        dest: &Path,
    ) -> std::result::Result<u64, PipelineError> {
        let Some(plan) = job.plan.clone() else {
            return Err(PipelineError::new(
                Step::Resolve,
                Error::Other("transfer job has no plan".to_string()),
            ));
        };
        let progress = job.progress();
        let result = match &plan.strategy {
            TransferStrategy::Direct { url } => self.direct(url, dest, &progress).await,
            TransferStrategy::Segmented { manifest_url } => {
                self.segmented(manifest_url, dest, &progress).await
            }
        };
        progress.finish();
        match result {
            Ok(written) => {
                job.transition(JobState::Acquired).at_step(Step::Transfer)?;
                info!(
                    track_id = job.track_id,
                    quality = %plan.signature,
                    bytes = written,
                    "track acquired"
                );
                Ok(written)
            }
            Err(e) => {
                job.fail();
                Err(e)
            }
        }
    }

    async fn direct(
        &self,
        url: &str,
        dest: &Path,
        progress: &TransferProgress,
    ) -> std::result::Result<u64, PipelineError> {
        let _slot = self.governor.download_slot().await.at_step(Step::Transfer)?;
        transfer_engine::download_to_file(self.source.as_ref(), url, dest, progress)
            .await
            .at_step(Step::Transfer)
    }

    async fn segmented(
        &self,
        manifest_url: &str,
        dest: &Path,
        progress: &TransferProgress,
    ) -> std::result::Result<u64, PipelineError> {
        let raw = TempArtifact::new(raw_path(dest));
        let written = SegmentedTransfer::new(self.source.clone(), self.transfer_config.clone())
            .with_download_slots(self.governor.download_slots())
            .run(manifest_url, raw.path(), progress)
            .await
            .at_step(Step::Transfer)?;

        let remuxed = self.remuxer.remux(raw.path(), dest).await;
        // The raw blob goes away whatever the remux outcome.
        drop(raw);
        if let Err(e) = remuxed {
            let _ = tokio::fs::remove_file(dest).await;
            return Err(PipelineError::new(Step::Remux, e));
        }
        Ok(written)
    }
}

/// Intermediate concatenation target next to `dest`.
fn raw_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".raw");
    dest.with_file_name(name)
}
