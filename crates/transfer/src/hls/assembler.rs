// Segmented transfer: fetch segments with bounded concurrency, decrypt them,
// and append them to one file in manifest order.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::{StreamExt, stream};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::TransferConfig;
use crate::direct::remove_partial;
use crate::error::TransferError;
use crate::hls::decryption::{DecryptionOffloader, KeyStore, fetch_keys};
use crate::hls::manifest::{Segment, resolve_manifest};
use crate::hls::reorder::ReorderBuffer;
use crate::progress::TransferProgress;
use crate::retry::retry_with_backoff;
use crate::source::ByteSource;

/// Turns a manifest URL into one decrypted, ordered file on disk.
pub struct SegmentedTransfer {
    source: Arc<dyn ByteSource>,
    config: TransferConfig,
    offloader: DecryptionOffloader,
    /// Shared pool bounding simultaneous network transfers; one permit per
    /// in-flight segment fetch.
    download_slots: Option<Arc<Semaphore>>,
}

impl SegmentedTransfer {
    pub fn new(source: Arc<dyn ByteSource>, config: TransferConfig) -> Self {
        let offloader = DecryptionOffloader::new(config.offload_decryption);
        Self {
            source,
            config,
            offloader,
            download_slots: None,
        }
    }

    pub fn with_download_slots(mut self, slots: Arc<Semaphore>) -> Self {
        self.download_slots = Some(slots);
        self
    }

    /// Run the transfer into `dest`.
    ///
    /// Any manifest, key, fetch or decryption failure aborts the whole
    /// transfer and removes `dest`.
    pub async fn run(
        &self,
        manifest_url: &str,
        dest: &Path,
        progress: &TransferProgress,
    ) -> Result<u64, TransferError> {
        let result = self.assemble(manifest_url, dest, progress).await;
        match &result {
            Ok(written) => {
                debug!(path = %dest.display(), bytes = written, "segmented transfer complete");
            }
            Err(e) => {
                remove_partial(dest).await;
                warn!(
                    manifest = manifest_url,
                    segment = e.segment_index(),
                    error = %e,
                    "segmented transfer failed"
                );
            }
        }
        result
    }

    async fn assemble(
        &self,
        manifest_url: &str,
        dest: &Path,
        progress: &TransferProgress,
    ) -> Result<u64, TransferError> {
        let plan = resolve_manifest(self.source.as_ref(), manifest_url, &self.config.retry).await?;
        if plan.segments.is_empty() {
            return Err(TransferError::manifest("playlist has no segments"));
        }
        progress.set_total_segments(plan.segments.len() as u64);
        let keys = fetch_keys(self.source.as_ref(), &plan, &self.config.retry).await?;
        debug!(
            segments = plan.segments.len(),
            keys = keys.len(),
            "resolved segment plan"
        );

        let mut writer = BufWriter::new(File::create(dest).await?);
        let mut reorder = ReorderBuffer::new(0);
        let mut written = 0u64;

        let mut fetches = stream::iter(&plan.segments)
            .map(|segment| self.fetch_segment(segment, &keys, progress))
            .buffer_unordered(self.config.segment_concurrency.max(1))
            .boxed();

        while let Some(result) = fetches.next().await {
            let (index, data) = result?;
            progress.segment_completed();
            reorder.insert(index, data)?;
            while let Some(ready) = reorder.pop_ready() {
                writer.write_all(&ready).await?;
                written += ready.len() as u64;
            }
        }
        drop(fetches);

        if !reorder.is_empty() || reorder.next_index() != plan.segments.len() {
            return Err(TransferError::Internal {
                reason: format!(
                    "reassembly stopped at segment {} of {}",
                    reorder.next_index(),
                    plan.segments.len()
                ),
            });
        }
        debug!(peak_buffered = reorder.peak_pending(), "segments reassembled");

        writer.flush().await?;
        writer.into_inner().sync_all().await?;
        Ok(written)
    }

    async fn fetch_segment(
        &self,
        segment: &Segment,
        keys: &KeyStore,
        progress: &TransferProgress,
    ) -> Result<(usize, Bytes), TransferError> {
        let permit = match &self.download_slots {
            Some(slots) => Some(slots.clone().acquire_owned().await.map_err(|_| {
                TransferError::Internal {
                    reason: "download pool closed".to_string(),
                }
            })?),
            None => None,
        };
        let data = retry_with_backoff(&self.config.retry, "segment", |_| {
            self.source.fetch(&segment.url, segment.byte_range)
        })
        .await
        .map_err(|e| e.for_segment(segment.index))?;
        drop(permit);
        progress.add_received(data.len() as u64);

        let plain = match &segment.key {
            Some(key) => {
                let key_bytes = keys.get(&key.uri)?;
                self.offloader
                    .decrypt(segment.index, data, key_bytes, &key.iv)
                    .await?
            }
            None => data,
        };
        Ok((segment.index, plain))
    }
}
