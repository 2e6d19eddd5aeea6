//! In-memory [`ByteSource`] for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::StatusCode;
use url::Url;

use crate::error::TransferError;
use crate::source::{BodyStream, ByteRange, ByteSource};

#[derive(Default, Clone)]
struct Entry {
    chunks: Vec<Vec<u8>>,
    status: Option<StatusCode>,
    declared_length: Option<u64>,
    stream_error: bool,
    delay: Duration,
}

#[derive(Default)]
pub(crate) struct MemorySource {
    entries: HashMap<String, Entry>,
    hits: Mutex<HashMap<String, usize>>,
}

fn normalize(url: &str) -> String {
    Url::parse(url).map(|u| u.to_string()).unwrap_or_else(|_| url.to_string())
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, url: &str) -> &mut Entry {
        self.entries.entry(normalize(url)).or_default()
    }

    pub fn with_body(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.entry(url).chunks = vec![body.into()];
        self
    }

    pub fn with_chunks(mut self, url: &str, chunks: Vec<Vec<u8>>) -> Self {
        self.entry(url).chunks = chunks;
        self
    }

    pub fn with_status(mut self, url: &str, status: StatusCode) -> Self {
        self.entry(url).status = Some(status);
        self
    }

    pub fn with_declared_length(mut self, url: &str, length: u64) -> Self {
        self.entry(url).declared_length = Some(length);
        self
    }

    pub fn with_stream_error(mut self, url: &str) -> Self {
        self.entry(url).stream_error = true;
        self
    }

    pub fn with_delay(mut self, url: &str, delay: Duration) -> Self {
        self.entry(url).delay = delay;
        self
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits
            .lock()
            .unwrap()
            .get(&normalize(url))
            .copied()
            .unwrap_or(0)
    }

    async fn lookup(&self, url: &Url) -> Result<Entry, TransferError> {
        *self
            .hits
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;
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
impl ByteSource for MemorySource {
    async fn fetch(&self, url: &Url, range: Option<ByteRange>) -> Result<Bytes, TransferError> {
        let entry = self.lookup(url).await?;
        let body = entry.chunks.concat();
        Ok(match range {
            Some(r) => {
                let start = r.offset as usize;
                let end = (start + r.length as usize).min(body.len());
                Bytes::copy_from_slice(&body[start.min(end)..end])
            }
            None => Bytes::from(body),
        })
    }

    async fn open(&self, url: &Url) -> Result<BodyStream, TransferError> {
        let entry = self.lookup(url).await?;
        let length = entry
            .declared_length
            .unwrap_or_else(|| entry.chunks.iter().map(|c| c.len() as u64).sum());
        let mut items: Vec<Result<Bytes, TransferError>> =
            entry.chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
        if entry.stream_error {
            items.push(Err(TransferError::Io {
                source: std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"),
            }));
        }
        Ok(BodyStream {
            content_length: Some(length),
            chunks: futures::stream::iter(items).boxed(),
        })
    }
}
