use std::path::{Path, PathBuf};

use clap::Parser;

use crate::{Error, Result};

#[derive(Parser, Debug)]
#[command(name = "beatportdl")]
#[command(about = "Download tracks, releases, playlists, charts, labels and artists from Beatport and Beatsource")]
#[command(version)]
pub struct Args {
    /// Store links to download
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// Read additional links from a file, one per line
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "BEATPORTDL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen for links sent to the Telegram bot instead of exiting after the batch
    #[arg(long)]
    pub telegram: bool,

    /// Override the configured quality (lossless, high, medium, medium-hls)
    #[arg(short, long)]
    pub quality: Option<String>,

    /// Enable verbose output (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors and warnings
    #[arg(short = 'Q', long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    /// Links from the command line followed by those in `--input`.
    pub async fn collect_urls(&self) -> Result<Vec<String>> {
        let mut urls = self.urls.clone();
        if let Some(path) = &self.input {
            urls.extend(read_url_file(path).await?);
        }
        Ok(urls)
    }
}

/// Non-empty lines of `path`; `#` starts a comment line.
pub async fn read_url_file(path: &Path) -> Result<Vec<String>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::io_path("reading link file", path, e))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
