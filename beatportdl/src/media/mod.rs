//! External media capabilities: remuxing raw stream data into a playable
//! container, and writing tags.

use std::path::Path;

use async_trait::async_trait;

use crate::Result;
use crate::tagging::ResolvedTags;

pub mod ffmpeg;

pub use ffmpeg::{FfmpegRemuxer, FfmpegTagWriter};

#[async_trait]
pub trait Remuxer: Send + Sync {
    /// Convert `raw` into a playable container at `dest`.
    ///
    /// On failure no file is left at `dest`.
    async fn remux(&self, raw: &Path, dest: &Path) -> Result<()>;
}

#[async_trait]
pub trait TagWriter: Send + Sync {
    /// Write `tags` (and optionally a cover `picture`) into `path`.
    ///
    /// Either every field lands or `path` is left untouched.
    async fn write_tags(&self, path: &Path, tags: &ResolvedTags, picture: Option<&Path>)
    -> Result<()>;
}
