use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid url `{0}`")]
    InvalidUrl(String),

    #[error("unsupported store in `{0}`")]
    UnsupportedStore(String),

    #[error("unsupported link type `{0}`")]
    UnsupportedLinkType(String),

    #[error("link `{0}` has no entity id")]
    MissingId(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing credentials for {0}")]
    MissingCredentials(&'static str),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("other: {0}")]
    Other(String),
}

impl CatalogError {
    pub fn http_status(status: StatusCode, url: impl Into<String>, operation: &'static str) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }
}
