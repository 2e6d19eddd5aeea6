//! Direct (progressive) transfer of one resource to one file.

use std::path::Path;

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use crate::error::TransferError;
use crate::progress::TransferProgress;
use crate::source::{ByteSource, parse_url};

/// Stream `url` into `dest`.
///
/// On any failure (error status, connection error, truncated body) the
/// partially written file is removed before the error is returned.
pub async fn download_to_file(
    source: &dyn ByteSource,
    url: &str,
    dest: &Path,
    progress: &TransferProgress,
) -> Result<u64, TransferError> {
    let result = write_body(source, url, dest, progress).await;
    match &result {
        Ok(written) => {
            debug!(path = %dest.display(), bytes = written, "direct transfer complete");
        }
        Err(e) => {
            remove_partial(dest).await;
            debug!(path = %dest.display(), error = %e, "direct transfer failed");
        }
    }
    result
}

async fn write_body(
    source: &dyn ByteSource,
    url: &str,
    dest: &Path,
    progress: &TransferProgress,
) -> Result<u64, TransferError> {
    let url = parse_url(url)?;
    let mut body = source.open(&url).await?;
    if let Some(total) = body.content_length {
        progress.set_total_bytes(total);
    }

    let mut writer = BufWriter::new(File::create(dest).await?);
    let mut written = 0u64;
    while let Some(chunk) = body.chunks.next().await {
        let chunk = chunk?;
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
        progress.add_received(chunk.len() as u64);
    }
    writer.flush().await?;
    writer.into_inner().sync_all().await?;

    if let Some(expected) = body.content_length
        && expected != written
    {
        return Err(TransferError::Truncated {
            expected,
            received: written,
        });
    }
    Ok(written)
}

pub(crate) async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove partial file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySource;
    use reqwest::StatusCode;

    const URL: &str = "https://cdn.example/track.flac?sig=abc";

    #[tokio::test]
    async fn test_writes_all_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("track.flac");
        let source = MemorySource::new().with_chunks(URL, vec![b"fLaC".to_vec(), b"data".to_vec()]);
        let progress = TransferProgress::new();

        let written = download_to_file(&source, URL, &dest, &progress).await.unwrap();
        assert_eq!(written, 8);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"fLaCdata");
        assert_eq!(progress.snapshot().position(), (8, 8));
    }

    #[tokio::test]
    async fn test_error_status_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("track.flac");
        let source = MemorySource::new().with_status(URL, StatusCode::FORBIDDEN);

        let err = download_to_file(&source, URL, &dest, &TransferProgress::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::HttpStatus { status, .. } if status == StatusCode::FORBIDDEN));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_truncated_body_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("track.flac");
        let source = MemorySource::new()
            .with_chunks(URL, vec![b"half".to_vec()])
            .with_declared_length(URL, 100);

        let err = download_to_file(&source, URL, &dest, &TransferProgress::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::Truncated {
                expected: 100,
                received: 4
            }
        ));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_broken_stream_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("track.flac");
        let source = MemorySource::new()
            .with_chunks(URL, vec![b"part".to_vec()])
            .with_stream_error(URL);

        assert!(
            download_to_file(&source, URL, &dest, &TransferProgress::new())
                .await
                .is_err()
        );
        assert!(!dest.exists());
    }
}
