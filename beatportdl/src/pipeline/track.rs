use std::path::{Path, PathBuf};

use catalog::{Catalog, Track, sanitize_filename};
use tracing::{debug, warn};

use super::{Orchestrator, TrackOutcome};
use crate::acquisition::{MediaSignature, TransferJob};
use crate::error::{PipelineError, Step, StepExt};
use crate::tagging::{field_values, resolve};
use crate::utils::fs::{self, TempArtifact};

impl Orchestrator {
    /// Run the pipeline of one track whose release is already attached.
    ///
    /// `dir` is the final directory; `cover` an already downloaded image,
    /// embedded when the cover policy asks for it.
    pub async fn handle_track(
        &self,
        catalog: &dyn Catalog,
        track: &Track,
        dir: &Path,
        cover: Option<&Path>,
        chat_id: Option<i64>,
    ) -> TrackOutcome {
        match self.run_track(catalog, track, dir, cover, chat_id).await {
            Ok(outcome) => outcome,
            Err(e) => TrackOutcome::Failed(e),
        }
    }

    async fn run_track(
        &self,
        catalog: &dyn Catalog,
        track: &Track,
        dir: &Path,
        cover: Option<&Path>,
        chat_id: Option<i64>,
    ) -> Result<TrackOutcome, PipelineError> {
        let _permit = self.governor.admit().await.at_step(Step::Resolve)?;

        let mut job = TransferJob::new(track.id, self.quality);
        let plan = self.selector.resolve(catalog, &mut job).await?;

        // Named after the resolved signature, not the configured quality.
        let prefs = self
            .config
            .naming_preferences(&self.config.naming.track_file_template);
        let filename = track.filename(&prefs, plan.extension());
        let final_path = dir.join(&filename);

        let save_to_disk = self.config.general.save_to_disk;
        if save_to_disk
            && !self.config.general.overwrite_existing
            && tokio::fs::try_exists(&final_path).await.unwrap_or(false)
        {
            return Ok(TrackOutcome::Skipped(final_path));
        }

        let temp_path = self.config.temp_directory().join(sanitize_filename(&filename));
        let Some(_claim) = self.governor.claim(temp_path.to_string_lossy()) else {
            return Ok(TrackOutcome::DroppedDuplicate);
        };
        let temp = TempArtifact::new(&temp_path);

        let display = self.progress.track(&filename, job.progress());
        let written = self.selector.acquire(&mut job, temp.path()).await?;
        display.finish(Some(written));

        if self.config.tagging.fix_tags {
            let picture = cover.filter(|_| self.covers.embeds());
            self.write_tags(catalog, track, plan.signature, temp.path(), picture)
                .await?;
        }

        if let (Some(delivery), Some(chat_id)) = (&self.delivery, chat_id)
            && let Err(e) = delivery.send_document(chat_id, temp.path()).await
        {
            warn!(track_id = track.id, chat_id, error = %e, "Failed to deliver track");
        }

        if !save_to_disk {
            return Ok(TrackOutcome::Delivered);
        }
        self.place(temp, &final_path).await?;
        Ok(TrackOutcome::Completed(final_path))
    }

    async fn write_tags(
        &self,
        catalog: &dyn Catalog,
        track: &Track,
        signature: MediaSignature,
        path: &Path,
        picture: Option<&Path>,
    ) -> Result<(), PipelineError> {
        let values = field_values(track, catalog.store(), &self.config.field_options());
        let tags = resolve(&values, &self.config.tagging.tag_mappings, signature.format())
            .at_step(Step::Tag)?;
        debug!(
            track_id = track.id,
            standard = tags.standard.len(),
            raw = tags.raw.len(),
            embed_cover = picture.is_some(),
            "Writing tags"
        );
        self.tag_writer
            .write_tags(path, &tags, picture)
            .await
            .at_step(Step::Tag)
    }

    /// Move the finished temp file to its final location.
    async fn place(&self, temp: TempArtifact, final_path: &Path) -> Result<PathBuf, PipelineError> {
        if let Some(parent) = final_path.parent() {
            fs::ensure_dir_all(parent).await.at_step(Step::Place)?;
        }
        fs::move_file(temp.path(), final_path)
            .await
            .at_step(Step::Place)?;
        temp.into_path();
        Ok(final_path.to_path_buf())
    }
}
