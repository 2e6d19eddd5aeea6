//! Catalog entities as returned by the store API.
//!
//! Entities are read-only snapshots. The only mutation after a fetch is
//! backfilling a track's release before naming and tagging consume it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::link::Store;

/// Cover size the catalog serves when no resize is requested.
pub const DEFAULT_COVER_SIZE: &str = "1400x1400";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub slug: String,
}

impl Artist {
    pub fn store_url(&self, store: Store) -> String {
        format!("{}/artist/{}/{}", store.web_origin(), self.slug, self.id)
    }
}

/// Ordered list of credited artists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Artists(pub Vec<Artist>);

impl Artists {
    /// Join artist names with `", "`.
    ///
    /// When `limit > 0` and there are more than `limit` artists, the list
    /// collapses to `short_form` if one is configured, otherwise it keeps the
    /// first `limit` names.
    pub fn display(&self, limit: usize, short_form: &str) -> String {
        if limit > 0 && self.0.len() > limit {
            if !short_form.is_empty() {
                return short_form.to_string();
            }
            return self.join(limit);
        }
        self.join(self.0.len())
    }

    fn join(&self, take: usize) -> String {
        self.0
            .iter()
            .take(take)
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<Artist>> for Artists {
    fn from(value: Vec<Artist>) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
}

impl Label {
    pub fn store_url(&self, store: Store) -> String {
        format!("{}/label/{}/{}", store.web_origin(), self.slug, self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub dynamic_uri: String,
}

impl Image {
    /// URL of the image resized to `size` (`"{w}x{h}"`, e.g. `"1400x1400"`).
    pub fn formatted_url(&self, size: &str) -> String {
        if self.dynamic_uri.is_empty() {
            return self.uri.clone();
        }
        self.dynamic_uri.replace("{w}x{h}", size)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BpmRange {
    pub min: u32,
    pub max: u32,
}

impl fmt::Display for BpmRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{}-{}", self.min, self.max)
        }
    }
}

/// Musical key notation used when rendering `{key}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeySystem {
    /// `"A Minor"`
    #[default]
    #[serde(rename = "standard")]
    Standard,
    /// `"Am"`
    #[serde(rename = "standard-short")]
    StandardShort,
    /// `"1m"`
    #[serde(rename = "openkey")]
    OpenKey,
    /// `"8A"`
    #[serde(rename = "camelot")]
    Camelot,
}

impl FromStr for KeySystem {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "standard-short" => Ok(Self::StandardShort),
            "openkey" => Ok(Self::OpenKey),
            "camelot" => Ok(Self::Camelot),
            other => Err(CatalogError::Other(format!("unknown key system `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChordType {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub letter: String,
    #[serde(default)]
    pub is_sharp: bool,
    #[serde(default)]
    pub is_flat: bool,
    #[serde(default)]
    pub camelot_number: u8,
    #[serde(default)]
    pub camelot_letter: String,
    #[serde(default)]
    pub chord_type: ChordType,
}

impl Key {
    fn is_minor(&self) -> bool {
        self.camelot_letter.eq_ignore_ascii_case("A")
            || self.chord_type.name.eq_ignore_ascii_case("minor")
    }

    pub fn display(&self, system: KeySystem) -> String {
        if self.name.is_empty() && self.camelot_number == 0 {
            return String::new();
        }
        match system {
            KeySystem::Standard => self.name.clone(),
            KeySystem::StandardShort => {
                let accidental = if self.is_sharp {
                    "#"
                } else if self.is_flat {
                    "b"
                } else {
                    ""
                };
                let minor = if self.is_minor() { "m" } else { "" };
                format!("{}{accidental}{minor}", self.letter)
            }
            KeySystem::OpenKey => {
                // Camelot 8B (C major) is Open Key 1d.
                let number = (u32::from(self.camelot_number) + 4) % 12 + 1;
                let mode = if self.is_minor() { "m" } else { "d" };
                format!("{number}{mode}")
            }
            KeySystem::Camelot => format!("{}{}", self.camelot_number, self.camelot_letter),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub artists: Artists,
    #[serde(default)]
    pub remixers: Artists,
    #[serde(default)]
    pub track_count: u32,
    #[serde(default, rename = "new_release_date")]
    pub date: String,
    #[serde(default)]
    pub catalog_number: String,
    #[serde(default)]
    pub upc: String,
    #[serde(default)]
    pub label: Label,
    #[serde(default)]
    pub image: Image,
    #[serde(default)]
    pub bpm_range: BpmRange,
}

impl Release {
    pub fn year(&self) -> String {
        self.date.chars().take(4).collect()
    }

    pub fn store_url(&self, store: Store) -> String {
        format!("{}/release/{}/{}", store.web_origin(), self.slug, self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mix_name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub artists: Artists,
    #[serde(default)]
    pub remixers: Artists,
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub bpm: u32,
    #[serde(default)]
    pub key: Key,
    #[serde(default)]
    pub genre: Genre,
    #[serde(default, rename = "sub_genre")]
    pub subgenre: Option<Genre>,
    #[serde(default)]
    pub isrc: String,
    #[serde(default)]
    pub length_ms: u64,
    #[serde(default)]
    pub release: Release,
}

impl Track {
    pub fn store_url(&self, store: Store) -> String {
        format!("{}/track/{}/{}", store.web_origin(), self.slug, self.id)
    }

    /// `"Name (Mix Name)"`, or just the name when there is no mix name.
    pub fn full_name(&self) -> String {
        if self.mix_name.is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, self.mix_name)
        }
    }

    pub fn genre_with_subgenre(&self, separator: &str) -> String {
        match &self.subgenre {
            Some(sub) if !sub.name.is_empty() => {
                format!("{}{separator}{}", self.genre.name, sub.name)
            }
            _ => self.genre.name.clone(),
        }
    }

    pub fn subgenre_or_genre(&self) -> String {
        match &self.subgenre {
            Some(sub) if !sub.name.is_empty() => sub.name.clone(),
            _ => self.genre.name.clone(),
        }
    }

    /// `m:ss` rendering of the track length.
    pub fn length(&self) -> String {
        let secs = self.length_ms / 1000;
        format!("{}:{:02}", secs / 60, secs % 60)
    }

    /// Attach the fully fetched release.
    pub fn with_release(mut self, release: Release) -> Self {
        self.release = release;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub track_count: u32,
    #[serde(default)]
    pub bpm_range: BpmRange,
    #[serde(default)]
    pub created_date: String,
    #[serde(default)]
    pub updated_date: String,
}

/// One entry of a playlist listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistItem {
    #[serde(default)]
    pub position: u32,
    pub track: Track,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartOwner {
    #[serde(default)]
    pub owner_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chart {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub image: Image,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub track_count: u32,
    #[serde(default)]
    pub person: Option<ChartOwner>,
    #[serde(default)]
    pub publish_date: String,
    #[serde(default)]
    pub updated_date: String,
}

impl Chart {
    pub fn creator(&self) -> &str {
        self.person
            .as_ref()
            .map(|p| p.owner_name.as_str())
            .unwrap_or_default()
    }
}

/// Signed, time-limited location of a downloadable file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadDescriptor {
    pub location: String,
    /// Media signature such as `".flac"` or `".256k.aac.mp4"`.
    #[serde(rename = "stream_quality")]
    pub signature: String,
}
