//! Byte sources: where transfers read from.
//!
//! [`HttpSource`] is the production source; tests substitute in-memory ones.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::Client;
use reqwest::header::RANGE;
use tracing::trace;
use url::Url;

use crate::config::TransferConfig;
use crate::error::TransferError;

/// `EXT-X-BYTERANGE` style sub-range of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    /// Value of the HTTP `Range` header (inclusive end).
    pub fn header_value(&self) -> String {
        let end = (self.offset + self.length).saturating_sub(1);
        format!("bytes={}-{end}", self.offset)
    }
}

/// A response body delivered in chunks.
pub struct BodyStream {
    pub content_length: Option<u64>,
    pub chunks: BoxStream<'static, Result<Bytes, TransferError>>,
}

#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Fetch a whole (small) resource or a sub-range of it into memory.
    async fn fetch(&self, url: &Url, range: Option<ByteRange>) -> Result<Bytes, TransferError>;

    /// Open a resource for streaming.
    async fn open(&self, url: &Url) -> Result<BodyStream, TransferError>;
}

pub fn parse_url(input: &str) -> Result<Url, TransferError> {
    Url::parse(input).map_err(|e| TransferError::invalid_url(input, e.to_string()))
}

#[derive(Clone)]
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(config: &TransferConfig) -> Result<Self, TransferError> {
        let mut builder = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout);
        if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.is_empty()) {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ByteSource for HttpSource {
    async fn fetch(&self, url: &Url, range: Option<ByteRange>) -> Result<Bytes, TransferError> {
        trace!(url = %url, ?range, "fetching");
        let mut request = self.client.get(url.clone());
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::http_status(status, url.as_str(), "fetch"));
        }
        Ok(response.bytes().await?)
    }

    async fn open(&self, url: &Url) -> Result<BodyStream, TransferError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::http_status(
                status,
                url.as_str(),
                "direct transfer",
            ));
        }
        Ok(BodyStream {
            content_length: response.content_length(),
            chunks: response.bytes_stream().map_err(TransferError::from).boxed(),
        })
    }
}
