//! Directory layout of the downloads tree and cover lifetimes.

use std::path::{Path, PathBuf};

use catalog::{Catalog, Image, Nameable, Release, sanitize_segment};
use tracing::warn;

use super::Orchestrator;
use crate::error::{PipelineError, Step, StepExt};
use crate::utils::fs::{self, TempArtifact};

impl Orchestrator {
    /// Directory of `entity` below `parent`, rendered with `template`.
    ///
    /// Without context sorting every track lands directly in `parent`.
    pub(crate) fn entity_directory(
        &self,
        parent: &Path,
        entity: &dyn Nameable,
        template: &str,
    ) -> PathBuf {
        if !self.config.sorting.sort_by_context {
            return parent.to_path_buf();
        }
        let name = entity.render_name(&self.config.naming_preferences(template));
        if name.is_empty() {
            return parent.to_path_buf();
        }
        parent.join(name)
    }

    /// Directory of `release`, with a label level in front of it when
    /// sorting by label and the parent is not already a label directory.
    pub(crate) fn release_directory(
        &self,
        parent: &Path,
        release: &Release,
        under_label: bool,
    ) -> PathBuf {
        if !self.config.sorting.sort_by_context {
            return parent.to_path_buf();
        }
        let mut base = parent.to_path_buf();
        if self.config.sorting.sort_by_label && !under_label {
            let whitespace = Some(self.config.naming.whitespace_character.as_str())
                .filter(|w| !w.is_empty());
            let label = sanitize_segment(&release.label.name, whitespace);
            if !label.is_empty() {
                base.push(label);
            }
        }
        self.entity_directory(&base, release, &self.config.naming.release_directory_template)
    }

    pub(crate) async fn setup_directory(&self, dir: &Path) -> Result<(), PipelineError> {
        fs::ensure_dir_all(dir).await.at_step(Step::Directory)
    }

    /// Remove `dir` if nothing ended up in it. The downloads root is kept.
    pub(crate) async fn cleanup(&self, dir: &Path) {
        let root = self.downloads_root();
        let mut current = Some(dir);
        // Walk up so an empty label level goes away with its release.
        while let Some(path) = current {
            if path == root || !path.starts_with(&root) {
                break;
            }
            fs::remove_dir_if_empty(path, &root).await;
            if tokio::fs::try_exists(path).await.unwrap_or(true) {
                break;
            }
            current = path.parent();
        }
    }

    /// Download the cover into `dir` if the current context needs one.
    ///
    /// A failed download only costs the artwork: tracks go on without it.
    pub(crate) async fn fetch_cover(
        &self,
        catalog: &dyn Catalog,
        image: &Image,
        dir: &Path,
        respect_fix_tags: bool,
        respect_keep_cover: bool,
    ) -> Option<TempArtifact> {
        if !self.covers.requires_cover(respect_fix_tags, respect_keep_cover)
            || image.formatted_url(&self.covers.cover_size).is_empty()
        {
            return None;
        }
        match self.covers.download(catalog, &self.governor, image, dir).await {
            Ok(cover) => Some(cover),
            Err(e) => {
                warn!(
                    dir = %dir.display(),
                    error = %e,
                    "Cover download failed, continuing without it"
                );
                None
            }
        }
    }

    /// Keep the cover as a sidecar or delete it, per policy.
    pub(crate) async fn finish_cover(&self, cover: Option<TempArtifact>) {
        let Some(cover) = cover else {
            return;
        };
        if let Err(e) = self.covers.finalize(cover).await {
            warn!(error = %e, "Failed to keep cover");
        }
    }
}
