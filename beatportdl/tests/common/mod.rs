//! In-memory collaborators for driving the orchestrator without network or ffmpeg.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use aes::Aes128;
use async_trait::async_trait;
use beatportdl::Result;
use beatportdl::batch::BatchRunner;
use beatportdl::config::AppConfig;
use beatportdl::delivery::Delivery;
use beatportdl::media::{Remuxer, TagWriter};
use beatportdl::pipeline::{Collaborators, Orchestrator};
use beatportdl::progress::ProgressDisplay;
use beatportdl::tagging::ResolvedTags;
use bytes::Bytes;
use catalog::{
    Artist, Artists, Catalog, CatalogError, Chart, DownloadDescriptor, Image, Label, Playlist,
    PlaylistItem, Release, Store, Track,
};
use cbc::cipher::{BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::StatusCode;
use tempfile::TempDir;
use transfer_engine::{BodyStream, ByteRange, ByteSource, TransferError};
use url::Url;

pub const CDN: &str = "https://cdn.example";
pub const SEGMENT_KEY: [u8; 16] = [0x5a; 16];

// ---------------------------------------------------------------------------
// Catalog

#[derive(Default)]
pub struct FakeCatalog {
    pub tracks: HashMap<u64, Track>,
    pub releases: HashMap<u64, Release>,
    pub release_tracks: HashMap<u64, Vec<Track>>,
    pub playlists: HashMap<u64, (Playlist, Vec<Track>)>,
    pub charts: HashMap<u64, (Chart, Vec<Track>)>,
    pub labels: HashMap<u64, (Label, Vec<Release>)>,
    pub artists: HashMap<u64, (Artist, Vec<Track>)>,
    /// Track id to `(location, signature)`.
    pub descriptors: HashMap<u64, (String, String)>,
    pub manifests: HashMap<u64, String>,
    pub files: HashMap<String, Bytes>,
    pub track_calls: AtomicUsize,
}

fn not_found(entity: &'static str, id: u64) -> CatalogError {
    CatalogError::NotFound { entity, id }
}

#[async_trait]
impl Catalog for FakeCatalog {
    fn store(&self) -> Store {
        Store::Beatport
    }

    async fn track(&self, id: u64) -> std::result::Result<Track, CatalogError> {
        self.track_calls.fetch_add(1, Ordering::SeqCst);
        self.tracks.get(&id).cloned().ok_or(not_found("track", id))
    }

    async fn release(&self, id: u64) -> std::result::Result<Release, CatalogError> {
        self.releases.get(&id).cloned().ok_or(not_found("release", id))
    }

    async fn release_tracks(&self, id: u64) -> std::result::Result<Vec<Track>, CatalogError> {
        self.release_tracks
            .get(&id)
            .cloned()
            .ok_or(not_found("release tracks", id))
    }

    async fn playlist(&self, id: u64) -> std::result::Result<Playlist, CatalogError> {
        self.playlists
            .get(&id)
            .map(|(p, _)| p.clone())
            .ok_or(not_found("playlist", id))
    }

    async fn playlist_tracks(
        &self,
        id: u64,
    ) -> std::result::Result<Vec<PlaylistItem>, CatalogError> {
        let (_, tracks) = self.playlists.get(&id).ok_or(not_found("playlist", id))?;
        Ok(tracks
            .iter()
            .enumerate()
            .map(|(i, track)| PlaylistItem {
                position: i as u32 + 1,
                track: track.clone(),
            })
            .collect())
    }

    async fn chart(&self, id: u64) -> std::result::Result<Chart, CatalogError> {
        self.charts
            .get(&id)
            .map(|(c, _)| c.clone())
            .ok_or(not_found("chart", id))
    }

    async fn chart_tracks(&self, id: u64) -> std::result::Result<Vec<Track>, CatalogError> {
        self.charts
            .get(&id)
            .map(|(_, t)| t.clone())
            .ok_or(not_found("chart", id))
    }

    async fn label(&self, id: u64) -> std::result::Result<Label, CatalogError> {
        self.labels
            .get(&id)
            .map(|(l, _)| l.clone())
            .ok_or(not_found("label", id))
    }

    async fn label_releases(
        &self,
        id: u64,
        _params: Option<&str>,
    ) -> std::result::Result<Vec<Release>, CatalogError> {
        self.labels
            .get(&id)
            .map(|(_, r)| r.clone())
            .ok_or(not_found("label", id))
    }

    async fn artist(&self, id: u64) -> std::result::Result<Artist, CatalogError> {
        self.artists
            .get(&id)
            .map(|(a, _)| a.clone())
            .ok_or(not_found("artist", id))
    }

    async fn artist_tracks(
        &self,
        id: u64,
        _params: Option<&str>,
    ) -> std::result::Result<Vec<Track>, CatalogError> {
        self.artists
            .get(&id)
            .map(|(_, t)| t.clone())
            .ok_or(not_found("artist", id))
    }

    async fn download_descriptor(
        &self,
        track_id: u64,
        _quality: &str,
    ) -> std::result::Result<DownloadDescriptor, CatalogError> {
        let (location, signature) = self
            .descriptors
            .get(&track_id)
            .cloned()
            .ok_or(not_found("track download", track_id))?;
        Ok(DownloadDescriptor {
            location,
            signature,
        })
    }

    async fn stream_manifest(&self, track_id: u64) -> std::result::Result<String, CatalogError> {
        self.manifests
            .get(&track_id)
            .cloned()
            .ok_or(not_found("track stream", track_id))
    }

    async fn download_file(&self, url: &str) -> std::result::Result<Bytes, CatalogError> {
        self.files
            .get(url)
            .cloned()
            .ok_or_else(|| CatalogError::Other(format!("no file at {url}")))
    }
}

// ---------------------------------------------------------------------------
// Byte source

#[derive(Clone, Default)]
struct Entry {
    body: Vec<u8>,
    status: Option<StatusCode>,
    delay: Duration,
}

#[derive(Default)]
pub struct FakeSource {
    entries: HashMap<String, Entry>,
    hits: Mutex<HashMap<String, usize>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.entries.entry(url.to_string()).or_default().body = body.into();
        self
    }

    pub fn with_status(mut self, url: &str, status: StatusCode) -> Self {
        self.entries.entry(url.to_string()).or_default().status = Some(status);
        self
    }

    pub fn with_delay(mut self, url: &str, delay: Duration) -> Self {
        self.entries.entry(url.to_string()).or_default().delay = delay;
        self
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().get(url).copied().unwrap_or(0)
    }

    async fn lookup(&self, url: &Url) -> std::result::Result<Entry, TransferError> {
        *self.hits.lock().entry(url.to_string()).or_default() += 1;
        let entry = self
            .entries
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| TransferError::http_status(StatusCode::NOT_FOUND, url.as_str(), "fetch"))?;
        if !entry.delay.is_zero() {
            tokio::time::sleep(entry.delay).await;
        }
        if let Some(status) = entry.status {
            return Err(TransferError::http_status(status, url.as_str(), "fetch"));
        }
        Ok(entry)
    }
}

#[async_trait]
impl ByteSource for FakeSource {
    async fn fetch(
        &self,
        url: &Url,
        _range: Option<ByteRange>,
    ) -> std::result::Result<Bytes, TransferError> {
        Ok(Bytes::from(self.lookup(url).await?.body))
    }

    async fn open(&self, url: &Url) -> std::result::Result<BodyStream, TransferError> {
        let entry = self.lookup(url).await?;
        let length = entry.body.len() as u64;
        let chunks: Vec<std::result::Result<Bytes, TransferError>> = entry
            .body
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(BodyStream {
            content_length: Some(length),
            chunks: futures::stream::iter(chunks).boxed(),
        })
    }
}

/// AES-128-CBC with PKCS#7 padding, the way segmented streams are encrypted.
pub fn encrypt(plaintext: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> Vec<u8> {
    cbc::Encryptor::<Aes128>::new(key.into(), iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// IV implied by a media sequence number.
pub fn sequence_iv(sequence: u64) -> [u8; 16] {
    u128::from(sequence).to_be_bytes()
}

pub fn segment_url(track_id: u64, index: usize) -> String {
    format!("{CDN}/hls/{track_id}/seg{index}.ts")
}

pub fn manifest_url(track_id: u64) -> String {
    format!("{CDN}/hls/{track_id}/index.m3u8")
}

pub fn segment_plaintext(index: usize) -> Vec<u8> {
    format!("adts-frames-of-segment-{index}-").repeat(index + 2).into_bytes()
}

/// An encrypted stream whose segments complete in the order given by `delays_ms`.
pub fn with_segmented_stream(mut source: FakeSource, track_id: u64, delays_ms: &[u64]) -> FakeSource {
    let mut manifest = String::from(
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n#EXT-X-MEDIA-SEQUENCE:0\n\
         #EXT-X-KEY:METHOD=AES-128,URI=\"key\"\n",
    );
    for (index, delay) in delays_ms.iter().enumerate() {
        manifest.push_str(&format!("#EXTINF:10.0,\nseg{index}.ts\n"));
        let encrypted = encrypt(
            &segment_plaintext(index),
            &SEGMENT_KEY,
            &sequence_iv(index as u64),
        );
        source = source
            .with_body(&segment_url(track_id, index), encrypted)
            .with_delay(&segment_url(track_id, index), Duration::from_millis(*delay));
    }
    manifest.push_str("#EXT-X-ENDLIST\n");
    source
        .with_body(&manifest_url(track_id), manifest)
        .with_body(&format!("{CDN}/hls/{track_id}/key"), SEGMENT_KEY.to_vec())
}

// ---------------------------------------------------------------------------
// Media capabilities and delivery

/// Copies the raw blob to the destination, or fails leaving nothing behind.
#[derive(Default)]
pub struct FakeRemuxer {
    pub fail: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl Remuxer for FakeRemuxer {
    async fn remux(&self, raw: &Path, dest: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(beatportdl::Error::Other("invalid data found when processing input".to_string()));
        }
        tokio::fs::copy(raw, dest).await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TagCall {
    pub file_name: String,
    pub tags: ResolvedTags,
    pub picture: Option<Vec<u8>>,
}

#[derive(Default)]
pub struct FakeTagWriter {
    pub fail: bool,
    pub calls: Mutex<Vec<TagCall>>,
}

#[async_trait]
impl TagWriter for FakeTagWriter {
    async fn write_tags(&self, path: &Path, tags: &ResolvedTags, picture: Option<&Path>) -> Result<()> {
        if self.fail {
            return Err(beatportdl::Error::Other("tag write failed".to_string()));
        }
        let picture = match picture {
            Some(p) => Some(tokio::fs::read(p).await?),
            None => None,
        };
        self.calls.lock().push(TagCall {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            tags: tags.clone(),
            picture,
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDelivery {
    pub documents: Mutex<Vec<(i64, String, Vec<u8>)>>,
    pub messages: Mutex<Vec<(i64, String)>>,
}

#[async_trait]
impl Delivery for FakeDelivery {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        self.messages.lock().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn send_document(&self, chat_id: i64, path: &Path) -> Result<()> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let data = tokio::fs::read(path).await?;
        self.documents.lock().push((chat_id, name, data));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures

pub fn artists(names: &[&str]) -> Artists {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| Artist {
            id: i as u64 + 1,
            name: name.to_string(),
            slug: name.to_lowercase(),
        })
        .collect::<Vec<_>>()
        .into()
}

pub fn cover_url(release_id: u64) -> String {
    format!("{CDN}/image/{release_id}.jpg")
}

pub fn release(id: u64, name: &str, track_count: u32) -> Release {
    Release {
        id,
        name: name.to_string(),
        slug: name.to_lowercase().replace(' ', "-"),
        artists: artists(&["deadmau5"]),
        track_count,
        date: "2009-09-22".to_string(),
        catalog_number: format!("MAU50{id}"),
        label: Label {
            id: 9,
            name: "mau5trap".to_string(),
            slug: "mau5trap".to_string(),
            ..Default::default()
        },
        image: Image {
            id,
            uri: cover_url(id),
            dynamic_uri: String::new(),
        },
        ..Default::default()
    }
}

pub fn track(id: u64, name: &str, number: u32, release: &Release) -> Track {
    Track {
        id,
        name: name.to_string(),
        mix_name: "Original Mix".to_string(),
        slug: name.to_lowercase(),
        artists: artists(&["deadmau5"]),
        number,
        bpm: 128,
        isrc: format!("CA5KR09000{id}"),
        release: release.clone(),
        ..Default::default()
    }
}

/// Everything a test needs around one orchestrator.
pub struct Harness {
    pub dir: TempDir,
    pub config: AppConfig,
    pub catalog: Arc<FakeCatalog>,
    pub source: Arc<FakeSource>,
    pub remuxer: Arc<FakeRemuxer>,
    pub tag_writer: Arc<FakeTagWriter>,
    pub delivery: Arc<FakeDelivery>,
}

impl Harness {
    pub fn new(catalog: FakeCatalog, source: FakeSource) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = AppConfig::default();
        config.general.downloads_directory = dir.path().join("downloads");
        config.general.temp_directory = Some(dir.path().join("tmp"));
        config.general.show_progress = false;
        config.transfer.max_retries = 0;
        config.concurrency.max_global_workers = 4;
        config.concurrency.max_download_workers = 4;
        std::fs::create_dir_all(dir.path().join("downloads")).expect("downloads dir");
        std::fs::create_dir_all(dir.path().join("tmp")).expect("tmp dir");

        Self {
            dir,
            config,
            catalog: Arc::new(catalog),
            source: Arc::new(source),
            remuxer: Arc::new(FakeRemuxer::default()),
            tag_writer: Arc::new(FakeTagWriter::default()),
            delivery: Arc::new(FakeDelivery::default()),
        }
    }

    pub fn downloads(&self) -> PathBuf {
        self.dir.path().join("downloads")
    }

    pub fn temp(&self) -> PathBuf {
        self.dir.path().join("tmp")
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        let catalog: Arc<dyn Catalog> = self.catalog.clone();
        let orchestrator = Orchestrator::new(
            Arc::new(self.config.clone()),
            Collaborators {
                catalogs: HashMap::from([(Store::Beatport, catalog)]),
                source: self.source.clone(),
                remuxer: self.remuxer.clone(),
                tag_writer: self.tag_writer.clone(),
                delivery: Some(self.delivery.clone()),
                progress: ProgressDisplay::new(false),
            },
        )
        .expect("orchestrator");
        Arc::new(orchestrator)
    }

    pub fn runner(&self) -> BatchRunner {
        BatchRunner::new(self.orchestrator())
    }
}

/// Every file below `dir`, relative to it, sorted.
pub fn files_under(dir: &Path) -> Vec<String> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(root, &path, out);
            } else if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    let mut out = Vec::new();
    walk(dir, dir, &mut out);
    out.sort();
    out
}

/// Entries directly below `dir`, files and directories alike.
pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
