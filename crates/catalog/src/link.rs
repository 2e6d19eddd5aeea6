//! Store link parsing.
//!
//! Turns a user-facing store URL into `{store, link type, id}`.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CatalogError;

/// Matches `/{type}/{slug}/{id}` and `/library/playlists/{id}` style paths.
static PATH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(?:[a-z]{2}/)?(?:(?P<type>track|release|playlist|chart|label|artist)s?/(?:(?P<slug>[^/]+)/)?|library/playlists/)(?P<id>\d+)/?$")
        .expect("link path regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Store {
    #[default]
    Beatport,
    Beatsource,
}

impl Store {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beatport => "beatport",
            Self::Beatsource => "beatsource",
        }
    }

    /// Public storefront origin used to build entity URLs.
    pub fn web_origin(&self) -> &'static str {
        match self {
            Self::Beatport => "https://www.beatport.com",
            Self::Beatsource => "https://www.beatsource.com",
        }
    }

    fn from_host(host: &str) -> Option<Self> {
        let host = host.trim_end_matches('.');
        let matches = |domain: &str| host == domain || host.ends_with(&format!(".{domain}"));
        if matches("beatport.com") {
            Some(Self::Beatport)
        } else if matches("beatsource.com") {
            Some(Self::Beatsource)
        } else {
            None
        }
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkType {
    Track,
    Release,
    Playlist,
    Chart,
    Label,
    Artist,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Release => "release",
            Self::Playlist => "playlist",
            Self::Chart => "chart",
            Self::Label => "label",
            Self::Artist => "artist",
        }
    }
}

impl FromStr for LinkType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "track" => Ok(Self::Track),
            "release" => Ok(Self::Release),
            "playlist" => Ok(Self::Playlist),
            "chart" => Ok(Self::Chart),
            "label" => Ok(Self::Label),
            "artist" => Ok(Self::Artist),
            other => Err(CatalogError::UnsupportedLinkType(other.to_string())),
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed store link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub original: String,
    pub store: Store,
    pub link_type: LinkType,
    pub id: u64,
    /// Raw query string, forwarded to listing endpoints (label/artist filters).
    pub params: Option<String>,
}

impl Link {
    pub fn parse(input: &str) -> Result<Self, CatalogError> {
        let trimmed = input.trim();
        let url = Url::parse(trimmed).map_err(|_| CatalogError::InvalidUrl(trimmed.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CatalogError::InvalidUrl(trimmed.to_string()));
        }

        let host = url
            .host_str()
            .ok_or_else(|| CatalogError::InvalidUrl(trimmed.to_string()))?;
        let store =
            Store::from_host(host).ok_or_else(|| CatalogError::UnsupportedStore(trimmed.to_string()))?;

        let path = url.path();
        let captures = match PATH_REGEX.captures(path) {
            Some(c) => c,
            None => {
                let first = path.trim_matches('/').split('/').next().unwrap_or_default();
                return Err(if first.is_empty() {
                    CatalogError::MissingId(trimmed.to_string())
                } else if first.parse::<LinkType>().is_ok()
                    || first.trim_end_matches('s').parse::<LinkType>().is_ok()
                {
                    CatalogError::MissingId(trimmed.to_string())
                } else {
                    CatalogError::UnsupportedLinkType(first.to_string())
                });
            }
        };

        let link_type = match captures.name("type") {
            Some(t) => t.as_str().parse()?,
            None => LinkType::Playlist,
        };
        let id = captures["id"]
            .parse::<u64>()
            .map_err(|_| CatalogError::MissingId(trimmed.to_string()))?;

        Ok(Self {
            original: trimmed.to_string(),
            store,
            link_type,
            id,
            params: url.query().filter(|q| !q.is_empty()).map(str::to_string),
        })
    }
}
