//! Naming engine: renders `{placeholder}` templates from entity fields into
//! sanitized path segments.
//!
//! Every entity kind exposes its own placeholder set through [`Nameable`];
//! callers never branch on the entity kind to name it.
//!
//! Supported placeholders:
//! - Track: `{id}`, `{name}`, `{mix_name}`, `{slug}`, `{artists}`, `{remixers}`,
//!   `{number}`, `{length}`, `{key}`, `{bpm}`, `{genre}`, `{subgenre}`,
//!   `{genre_with_subgenre}`, `{subgenre_or_genre}`, `{isrc}`, `{label}`,
//!   `{release_name}`, `{catalog_number}`, `{year}`
//! - Release: `{id}`, `{name}`, `{slug}`, `{artists}`, `{remixers}`, `{date}`,
//!   `{year}`, `{track_count}`, `{bpm_range}`, `{catalog_number}`, `{upc}`, `{label}`
//! - Playlist: `{id}`, `{name}`, `{first_genre}`, `{track_count}`, `{bpm_range}`,
//!   `{created_date}`, `{updated_date}`
//! - Chart: `{id}`, `{name}`, `{slug}`, `{first_genre}`, `{track_count}`,
//!   `{creator}`, `{published_date}`, `{updated_date}`
//! - Label: `{id}`, `{name}`, `{slug}`, `{created_date}`, `{updated_date}`
//! - Artist: `{id}`, `{name}`, `{slug}`
//!
//! Unknown placeholders are kept literally.

use std::collections::HashMap;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::model::{Artist, Chart, Genre, KeySystem, Label, Playlist, Release, Track};
use crate::sanitize::sanitize_segment;

/// Placeholder name to rendered value.
pub type TemplateFields = HashMap<&'static str, String>;

/// Left-zero-padding applied to `{number}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PaddingRepr", into = "PaddingRepr")]
pub enum NumberPadding {
    Off,
    /// Width is the digit count of the sibling total.
    #[default]
    Auto,
    Fixed(usize),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PaddingRepr {
    Width(usize),
    Mode(String),
}

impl TryFrom<PaddingRepr> for NumberPadding {
    type Error = String;

    fn try_from(value: PaddingRepr) -> Result<Self, Self::Error> {
        match value {
            PaddingRepr::Width(0) => Ok(Self::Off),
            PaddingRepr::Width(w) => Ok(Self::Fixed(w)),
            PaddingRepr::Mode(mode) => match mode.as_str() {
                "off" | "none" => Ok(Self::Off),
                "auto" => Ok(Self::Auto),
                other => Err(format!(
                    "invalid track number padding `{other}`, expected \"off\", \"auto\" or a width"
                )),
            },
        }
    }
}

impl From<NumberPadding> for PaddingRepr {
    fn from(value: NumberPadding) -> Self {
        match value {
            NumberPadding::Off => Self::Mode("off".to_string()),
            NumberPadding::Auto => Self::Mode("auto".to_string()),
            NumberPadding::Fixed(w) => Self::Width(w),
        }
    }
}

/// Number of decimal digits in `value`, at least one.
fn digits(value: u32) -> usize {
    value.checked_ilog10().map_or(1, |d| d as usize + 1)
}

/// Render `value` padded according to `padding`, relative to `total` siblings.
pub fn number_with_padding(value: u32, total: u32, padding: NumberPadding) -> String {
    let width = match padding {
        NumberPadding::Off => return value.to_string(),
        NumberPadding::Auto => digits(total),
        NumberPadding::Fixed(w) => w,
    };
    format!("{value:0width$}")
}

/// Immutable naming inputs for one naming call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamingPreferences {
    pub template: String,
    pub whitespace: Option<String>,
    pub artists_limit: usize,
    pub artists_short_form: String,
    pub track_number_padding: NumberPadding,
    pub key_system: KeySystem,
}

impl NamingPreferences {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            ..Default::default()
        }
    }
}

/// Substitute every `{placeholder}` known to `fields`.
pub fn render(template: &str, fields: &TemplateFields) -> String {
    let mut result = String::with_capacity(template.len() * 2);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        result.push_str(&rest[..open]);
        let tail = &rest[open..];
        let Some(close) = tail.find('}') else {
            result.push_str(tail);
            return result;
        };
        let name = &tail[1..close];
        match fields.get(name) {
            Some(value) => result.push_str(value),
            None => result.push_str(&tail[..=close]),
        }
        rest = &tail[close + 1..];
    }
    result.push_str(rest);
    result
}

/// An entity that can be rendered into a path segment.
pub trait Nameable {
    fn template_fields(&self, prefs: &NamingPreferences) -> TemplateFields;

    /// Rendered and sanitized path segment for `prefs.template`.
    fn render_name(&self, prefs: &NamingPreferences) -> String {
        let rendered = render(&prefs.template, &self.template_fields(prefs));
        sanitize_segment(&rendered, prefs.whitespace.as_deref())
    }
}

/// `YYYY-MM-DD` from a catalog timestamp.
fn date_only(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.date_naive().to_string())
        .unwrap_or_else(|_| raw.chars().take(10).collect())
}

fn first_genre(genres: &[Genre]) -> String {
    genres.first().map(|g| g.name.clone()).unwrap_or_default()
}

impl Track {
    /// Final filename: the rendered template plus `extension` (e.g. `".flac"`).
    pub fn filename(&self, prefs: &NamingPreferences, extension: &str) -> String {
        format!("{}{extension}", self.render_name(prefs))
    }
}

impl Nameable for Track {
    fn template_fields(&self, prefs: &NamingPreferences) -> TemplateFields {
        let limit = prefs.artists_limit;
        let short = prefs.artists_short_form.as_str();
        TemplateFields::from([
            ("id", self.id.to_string()),
            ("name", self.name.clone()),
            ("mix_name", self.mix_name.clone()),
            ("slug", self.slug.clone()),
            ("artists", self.artists.display(limit, short)),
            ("remixers", self.remixers.display(limit, short)),
            (
                "number",
                number_with_padding(
                    self.number,
                    self.release.track_count,
                    prefs.track_number_padding,
                ),
            ),
            ("length", self.length()),
            ("key", self.key.display(prefs.key_system)),
            ("bpm", self.bpm.to_string()),
            ("genre", self.genre.name.clone()),
            (
                "subgenre",
                self.subgenre
                    .as_ref()
                    .map(|g| g.name.clone())
                    .unwrap_or_default(),
            ),
            ("genre_with_subgenre", self.genre_with_subgenre(" | ")),
            ("subgenre_or_genre", self.subgenre_or_genre()),
            ("isrc", self.isrc.clone()),
            ("label", self.release.label.name.clone()),
            ("release_name", self.release.name.clone()),
            ("catalog_number", self.release.catalog_number.clone()),
            ("year", self.release.year()),
        ])
    }
}

impl Nameable for Release {
    fn template_fields(&self, prefs: &NamingPreferences) -> TemplateFields {
        let limit = prefs.artists_limit;
        let short = prefs.artists_short_form.as_str();
        TemplateFields::from([
            ("id", self.id.to_string()),
            ("name", self.name.clone()),
            ("slug", self.slug.clone()),
            ("artists", self.artists.display(limit, short)),
            ("remixers", self.remixers.display(limit, short)),
            ("date", self.date.clone()),
            ("year", self.year()),
            ("track_count", self.track_count.to_string()),
            ("bpm_range", self.bpm_range.to_string()),
            ("catalog_number", self.catalog_number.clone()),
            ("upc", self.upc.clone()),
            ("label", self.label.name.clone()),
        ])
    }
}

impl Nameable for Playlist {
    fn template_fields(&self, _prefs: &NamingPreferences) -> TemplateFields {
        TemplateFields::from([
            ("id", self.id.to_string()),
            ("name", self.name.clone()),
            ("first_genre", first_genre(&self.genres)),
            ("track_count", self.track_count.to_string()),
            ("bpm_range", self.bpm_range.to_string()),
            ("created_date", date_only(&self.created_date)),
            ("updated_date", date_only(&self.updated_date)),
        ])
    }
}

impl Nameable for Chart {
    fn template_fields(&self, _prefs: &NamingPreferences) -> TemplateFields {
        TemplateFields::from([
            ("id", self.id.to_string()),
            ("name", self.name.clone()),
            ("slug", self.slug.clone()),
            ("first_genre", first_genre(&self.genres)),
            ("track_count", self.track_count.to_string()),
            ("creator", self.creator().to_string()),
            ("published_date", date_only(&self.publish_date)),
            ("updated_date", date_only(&self.updated_date)),
        ])
    }
}

impl Nameable for Label {
    fn template_fields(&self, _prefs: &NamingPreferences) -> TemplateFields {
        TemplateFields::from([
            ("id", self.id.to_string()),
            ("name", self.name.clone()),
            ("slug", self.slug.clone()),
            (
                "created_date",
                self.created.as_deref().map(date_only).unwrap_or_default(),
            ),
            (
                "updated_date",
                self.updated.as_deref().map(date_only).unwrap_or_default(),
            ),
        ])
    }
}

impl Nameable for Artist {
    fn template_fields(&self, _prefs: &NamingPreferences) -> TemplateFields {
        TemplateFields::from([
            ("id", self.id.to_string()),
            ("name", self.name.clone()),
            ("slug", self.slug.clone()),
        ])
    }
}
