//! ffmpeg-backed [`Remuxer`] and [`TagWriter`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use process_utils::{run_tool, tokio_command};
use tracing::debug;

use super::{Remuxer, TagWriter};
use crate::Result;
use crate::tagging::ResolvedTags;
use crate::utils::fs::TempArtifact;

async fn run_ffmpeg(ffmpeg: &Path, args: Vec<OsString>) -> Result<()> {
    let program = ffmpeg.to_string_lossy().into_owned();
    let mut command = tokio_command(ffmpeg);
    command.args(args);
    let output = run_tool(&mut command).await?.into_result(&program)?;
    debug!(program = %program, duration_secs = output.duration_secs, "ffmpeg finished");
    Ok(())
}

/// Copies the audio stream of an ADTS/TS blob into an MP4 container.
#[derive(Debug, Clone)]
pub struct FfmpegRemuxer {
    ffmpeg: PathBuf,
}

impl FfmpegRemuxer {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }
}

pub(crate) fn remux_args(raw: &Path, dest: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-y", "-hide_banner", "-loglevel", "error", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(raw.into());
    args.extend(
        ["-map", "0:a", "-c", "copy", "-bsf:a", "aac_adtstoasc"]
            .into_iter()
            .map(OsString::from),
    );
    args.push(dest.into());
    args
}

#[async_trait]
impl Remuxer for FfmpegRemuxer {
    async fn remux(&self, raw: &Path, dest: &Path) -> Result<()> {
        // Guards dest until ffmpeg reports success.
        let output = TempArtifact::new(dest);
        run_ffmpeg(&self.ffmpeg, remux_args(raw, dest)).await?;
        output.into_path();
        Ok(())
    }
}

/// Rewrites a file with new metadata through a sibling temp file.
#[derive(Debug, Clone)]
pub struct FfmpegTagWriter {
    ffmpeg: PathBuf,
}

impl FfmpegTagWriter {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }
}

fn is_mp4(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("m4a" | "mp4")
    )
}

/// `dir/name.tagging.ext`, keeping the extension so ffmpeg picks the muxer.
fn sibling_temp(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}.tagging.{}", ext.to_string_lossy()),
        None => format!("{stem}.tagging"),
    };
    path.with_file_name(name)
}

pub(crate) fn tag_args(
    input: &Path,
    output: &Path,
    tags: &ResolvedTags,
    picture: Option<&Path>,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        input.into(),
    ];
    if let Some(picture) = picture {
        args.extend(["-i".into(), picture.into()]);
    }
    if picture.is_some() {
        // The new picture replaces whatever artwork the file carried.
        args.extend([
            "-map".into(),
            "0:a".into(),
            "-map".into(),
            "1:v".into(),
            "-disposition:v:0".into(),
            "attached_pic".into(),
        ]);
    } else {
        // Every stream, so artwork already in the file survives.
        args.extend(["-map".into(), "0".into()]);
    }
    args.extend(["-c".into(), "copy".into(), "-map_metadata".into(), "0".into()]);

    for (key, value) in tags.standard.iter().chain(tags.raw.iter()) {
        args.push("-metadata".into());
        args.push(format!("{key}={value}").into());
    }
    if !tags.raw.is_empty() && is_mp4(output) {
        args.extend(["-movflags".into(), "use_metadata_tags".into()]);
    }
    args.push(output.into());
    args
}

#[async_trait]
impl TagWriter for FfmpegTagWriter {
    async fn write_tags(
        &self,
        path: &Path,
        tags: &ResolvedTags,
        picture: Option<&Path>,
    ) -> Result<()> {
        if tags.is_empty() && picture.is_none() {
            return Ok(());
        }
        let staged = TempArtifact::new(sibling_temp(path));
        run_ffmpeg(&self.ffmpeg, tag_args(path, staged.path(), tags, picture)).await?;
        crate::utils::fs::move_file(staged.path(), path).await?;
        staged.into_path();
        debug!(path = %path.display(), fields = tags.len(), "tags written");
        Ok(())
    }
}
