//! Catalog service access.
//!
//! [`Catalog`] is the typed contract the pipeline depends on; [`HttpCatalog`]
//! implements it against the store's v4 JSON API. Token acquisition is not
//! handled here: an already valid bearer token is supplied by configuration.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::error::CatalogError;
use crate::link::Store;
use crate::model::{
    Artist, Chart, DownloadDescriptor, Label, Playlist, PlaylistItem, Release, Track,
};

pub const BEATPORT_API_URL: &str = "https://api.beatport.com/v4/";
pub const BEATSOURCE_API_URL: &str = "https://api.beatsource.com/v4/";

const USER_AGENT: &str = concat!("beatportdl/", env!("CARGO_PKG_VERSION"));

/// Typed catalog operations. Any error is fatal to the entity being fetched.
#[async_trait]
pub trait Catalog: Send + Sync {
    fn store(&self) -> Store;

    async fn track(&self, id: u64) -> Result<Track, CatalogError>;
    async fn release(&self, id: u64) -> Result<Release, CatalogError>;
    async fn release_tracks(&self, id: u64) -> Result<Vec<Track>, CatalogError>;
    async fn playlist(&self, id: u64) -> Result<Playlist, CatalogError>;
    async fn playlist_tracks(&self, id: u64) -> Result<Vec<PlaylistItem>, CatalogError>;
    async fn chart(&self, id: u64) -> Result<Chart, CatalogError>;
    async fn chart_tracks(&self, id: u64) -> Result<Vec<Track>, CatalogError>;
    async fn label(&self, id: u64) -> Result<Label, CatalogError>;
    async fn label_releases(
        &self,
        id: u64,
        params: Option<&str>,
    ) -> Result<Vec<Release>, CatalogError>;
    async fn artist(&self, id: u64) -> Result<Artist, CatalogError>;
    async fn artist_tracks(&self, id: u64, params: Option<&str>)
    -> Result<Vec<Track>, CatalogError>;

    /// Signed, time-limited direct download location for `quality`.
    async fn download_descriptor(
        &self,
        track_id: u64,
        quality: &str,
    ) -> Result<DownloadDescriptor, CatalogError>;

    /// Manifest URL of the segmented stream.
    async fn stream_manifest(&self, track_id: u64) -> Result<String, CatalogError>;

    /// Fetch a small auxiliary file such as a cover image.
    async fn download_file(&self, url: &str) -> Result<Bytes, CatalogError>;
}

#[derive(Debug, Clone)]
pub struct HttpCatalogConfig {
    pub store: Store,
    pub base_url: String,
    pub access_token: Option<String>,
    pub proxy: Option<String>,
    pub timeout: Duration,
}

impl HttpCatalogConfig {
    pub fn for_store(store: Store) -> Self {
        let base_url = match store {
            Store::Beatport => BEATPORT_API_URL,
            Store::Beatsource => BEATSOURCE_API_URL,
        };
        Self {
            store,
            base_url: base_url.to_string(),
            access_token: None,
            proxy: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// One page of a list endpoint.
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    next: Option<String>,
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    stream_url: String,
}

pub struct HttpCatalog {
    client: Client,
    store: Store,
    base_url: Url,
    access_token: String,
}

impl HttpCatalog {
    pub fn new(config: HttpCatalogConfig) -> Result<Self, CatalogError> {
        let access_token = config
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or(CatalogError::MissingCredentials(config.store.as_str()))?;

        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout);
        if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.is_empty()) {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
            store: config.store,
            base_url: parse_base_url(&config.base_url)?,
            access_token,
        })
    }

    fn endpoint(&self, path: &str, params: Option<&str>) -> Result<Url, CatalogError> {
        endpoint_url(&self.base_url, path, params)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        entity: &'static str,
        id: u64,
    ) -> Result<T, CatalogError> {
        trace!(url = %url, "catalog request");
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(CatalogError::NotFound { entity, id }),
            status if !status.is_success() => {
                Err(CatalogError::http_status(status, url.as_str(), entity))
            }
            _ => {
                let body = response.bytes().await?;
                Ok(serde_json::from_slice(&body)?)
            }
        }
    }

    /// Follow `next` links until the listing is exhausted.
    async fn get_all<T: DeserializeOwned>(
        &self,
        first: Url,
        entity: &'static str,
        id: u64,
    ) -> Result<Vec<T>, CatalogError> {
        let mut items = Vec::new();
        let mut next = Some(first);
        while let Some(url) = next.take() {
            let page: Page<T> = self.get_json(url, entity, id).await?;
            items.extend(page.results);
            next = page
                .next
                .as_deref()
                .map(|n| Url::parse(n).map_err(|_| CatalogError::InvalidUrl(n.to_string())))
                .transpose()?;
        }
        debug!(entity, id, count = items.len(), "fetched listing");
        Ok(items)
    }
}

fn parse_base_url(raw: &str) -> Result<Url, CatalogError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|_| CatalogError::InvalidUrl(raw.to_string()))
}

fn endpoint_url(base: &Url, path: &str, params: Option<&str>) -> Result<Url, CatalogError> {
    let mut url = base
        .join(path)
        .map_err(|_| CatalogError::InvalidUrl(format!("{base}{path}")))?;
    if let Some(query) = params.filter(|q| !q.is_empty()) {
        url.set_query(Some(query));
    }
    Ok(url)
}

#[async_trait]
impl Catalog for HttpCatalog {
    fn store(&self) -> Store {
        self.store
    }

    async fn track(&self, id: u64) -> Result<Track, CatalogError> {
        let url = self.endpoint(&format!("catalog/tracks/{id}/"), None)?;
        self.get_json(url, "track", id).await
    }

    async fn release(&self, id: u64) -> Result<Release, CatalogError> {
        let url = self.endpoint(&format!("catalog/releases/{id}/"), None)?;
        self.get_json(url, "release", id).await
    }

    async fn release_tracks(&self, id: u64) -> Result<Vec<Track>, CatalogError> {
        let url = self.endpoint(&format!("catalog/releases/{id}/tracks/"), None)?;
        self.get_all(url, "release tracks", id).await
    }

    async fn playlist(&self, id: u64) -> Result<Playlist, CatalogError> {
        let url = self.endpoint(&format!("catalog/playlists/{id}/"), None)?;
        self.get_json(url, "playlist", id).await
    }

    async fn playlist_tracks(&self, id: u64) -> Result<Vec<PlaylistItem>, CatalogError> {
        let url = self.endpoint(&format!("catalog/playlists/{id}/tracks/"), None)?;
        self.get_all(url, "playlist tracks", id).await
    }

    async fn chart(&self, id: u64) -> Result<Chart, CatalogError> {
        let url = self.endpoint(&format!("catalog/charts/{id}/"), None)?;
        self.get_json(url, "chart", id).await
    }

    async fn chart_tracks(&self, id: u64) -> Result<Vec<Track>, CatalogError> {
        let url = self.endpoint(&format!("catalog/charts/{id}/tracks/"), None)?;
        self.get_all(url, "chart tracks", id).await
    }

    async fn label(&self, id: u64) -> Result<Label, CatalogError> {
        let url = self.endpoint(&format!("catalog/labels/{id}/"), None)?;
        self.get_json(url, "label", id).await
    }

    async fn label_releases(
        &self,
        id: u64,
        params: Option<&str>,
    ) -> Result<Vec<Release>, CatalogError> {
        let url = self.endpoint(&format!("catalog/labels/{id}/releases/"), params)?;
        self.get_all(url, "label releases", id).await
    }

    async fn artist(&self, id: u64) -> Result<Artist, CatalogError> {
        let url = self.endpoint(&format!("catalog/artists/{id}/"), None)?;
        self.get_json(url, "artist", id).await
    }

    async fn artist_tracks(
        &self,
        id: u64,
        params: Option<&str>,
    ) -> Result<Vec<Track>, CatalogError> {
        let url = self.endpoint(&format!("catalog/artists/{id}/tracks/"), params)?;
        self.get_all(url, "artist tracks", id).await
    }

    async fn download_descriptor(
        &self,
        track_id: u64,
        quality: &str,
    ) -> Result<DownloadDescriptor, CatalogError> {
        let mut url = self.endpoint(&format!("catalog/tracks/{track_id}/download/"), None)?;
        url.query_pairs_mut().append_pair("quality", quality);
        self.get_json(url, "track download", track_id).await
    }

    async fn stream_manifest(&self, track_id: u64) -> Result<String, CatalogError> {
        let url = self.endpoint(&format!("catalog/tracks/{track_id}/stream/"), None)?;
        let stream: StreamResponse = self.get_json(url, "track stream", track_id).await?;
        Ok(stream.stream_url)
    }

    async fn download_file(&self, url: &str) -> Result<Bytes, CatalogError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::http_status(status, url, "file download"));
        }
        Ok(response.bytes().await?)
    }
}
