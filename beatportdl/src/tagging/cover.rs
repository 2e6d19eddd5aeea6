//! Cover art: when to fetch it, and what happens to the file afterwards.

use std::path::{Path, PathBuf};

use catalog::{Catalog, DEFAULT_COVER_SIZE, Image};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::acquisition::Quality;
use crate::config::AppConfig;
use crate::governor::Governor;
use crate::utils::fs::{self, TempArtifact};
use crate::{Error, Result};

/// Sidecar name a kept cover is renamed to.
pub const COVER_FILENAME: &str = "cover.jpg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverPolicy {
    pub fix_tags: bool,
    pub embed_cover: bool,
    pub keep_cover: bool,
    pub sort_by_context: bool,
    pub cover_size: String,
    pub quality: Quality,
}

impl CoverPolicy {
    pub fn from_config(config: &AppConfig, quality: Quality) -> Self {
        Self {
            fix_tags: config.tagging.fix_tags,
            embed_cover: config.tagging.embed_cover,
            keep_cover: config.tagging.keep_cover,
            sort_by_context: config.sorting.sort_by_context,
            cover_size: config.tagging.cover_size.clone(),
            quality,
        }
    }

    /// Whether the cover should be embedded into tracks.
    ///
    /// Lossless downloads already carry a default-size cover.
    pub fn embeds(&self) -> bool {
        self.fix_tags
            && self.embed_cover
            && (self.cover_size != DEFAULT_COVER_SIZE || self.quality != Quality::Lossless)
    }

    /// Whether a `cover.jpg` sidecar is kept next to the tracks.
    pub fn keeps_sidecar(&self) -> bool {
        self.sort_by_context && self.keep_cover
    }

    /// Whether a cover has to be downloaded for the current context.
    pub fn requires_cover(&self, respect_fix_tags: bool, respect_keep_cover: bool) -> bool {
        (respect_fix_tags && self.embeds()) || (respect_keep_cover && self.keeps_sidecar())
    }

    /// Download `image` into `dir` under a random name, holding a download slot.
    ///
    /// The returned artifact removes the file when dropped unless it is
    /// finalized with [`CoverPolicy::finalize`].
    pub async fn download(
        &self,
        catalog: &dyn Catalog,
        governor: &Governor,
        image: &Image,
        dir: &Path,
    ) -> Result<TempArtifact> {
        let url = image.formatted_url(&self.cover_size);
        if url.is_empty() {
            return Err(Error::Other("entity has no cover image".to_string()));
        }
        let path = dir.join(Uuid::new_v4().to_string());
        let artifact = TempArtifact::new(path);

        let _slot = governor.download_slot().await?;
        let data = catalog.download_file(&url).await?;
        // A sibling sharing `dir` may have removed it while it was empty.
        fs::ensure_dir_all(dir).await?;
        tokio::fs::write(artifact.path(), &data)
            .await
            .map_err(|e| Error::io_path("writing cover", artifact.path(), e))?;
        debug!(path = %artifact.path().display(), bytes = data.len(), "cover downloaded");
        Ok(artifact)
    }

    /// Rename the cover to its sidecar name, or delete it.
    pub async fn finalize(&self, cover: TempArtifact) -> Result<Option<PathBuf>> {
        if !self.keeps_sidecar() {
            drop(cover);
            return Ok(None);
        }
        let Some(dir) = cover.path().parent().map(Path::to_path_buf) else {
            return Ok(None);
        };
        let target = dir.join(COVER_FILENAME);
        let source = cover.into_path();
        if let Err(e) = tokio::fs::rename(&source, &target).await {
            warn!(path = %source.display(), error = %e, "failed to keep cover");
            let _ = tokio::fs::remove_file(&source).await;
            return Err(Error::io_path("renaming cover", &source, e));
        }
        Ok(Some(target))
    }
}
