//! Tag mapper: projects track and release metadata onto container-specific
//! tag identifiers under a user-editable mapping table.
//!
//! Logical field names available to mapping tables:
//!
//! | field | value |
//! |---|---|
//! | `track_id`, `track_url` | catalog id and store URL |
//! | `track_name` | `"Name (Mix Name)"` |
//! | `track_artists`, `track_remixers` | full credit lists |
//! | `track_artists_limited`, `track_remixers_limited` | lists under the artists limit/short form |
//! | `track_number`, `track_number_with_padding`, `track_number_with_total` | `7`, `007`, `7/120` |
//! | `track_genre`, `track_subgenre`, `track_genre_with_subgenre`, `track_subgenre_or_genre` | genre variants |
//! | `track_key`, `track_bpm`, `track_isrc` | musical key (configured notation), tempo, ISRC |
//! | `release_id`, `release_url`, `release_name` | release identity |
//! | `release_artists`, `release_remixers`, `release_artists_limited`, `release_remixers_limited` | release credits |
//! | `release_date`, `release_year` | release date and year |
//! | `release_track_count`, `release_track_count_with_padding` | sibling count |
//! | `release_catalog_number`, `release_upc`, `release_label`, `release_label_url` | label data |
//!
//! An output identifier ending in [`RAW_TAG_SUFFIX`] is written as a
//! non-standard tag named without the suffix.

use std::collections::{BTreeMap, HashMap};

use catalog::{KeySystem, NumberPadding, Store, Track, number_with_padding};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Identifier suffix marking a non-standard (raw) tag destination.
pub const RAW_TAG_SUFFIX: &str = "_raw";

/// Key of the table used when a format has none of its own.
pub const DEFAULT_MAPPING_KEY: &str = "default";

/// Logical field name to rendered value.
pub type FieldValues = HashMap<&'static str, String>;

/// Inputs of [`field_values`] taken from configuration.
#[derive(Debug, Clone, Default)]
pub struct FieldOptions {
    pub artists_limit: usize,
    pub artists_short_form: String,
    pub track_number_padding: NumberPadding,
    pub key_system: KeySystem,
}

/// Flatten `track` (with its release backfilled) into logical field values.
///
/// Missing optional data renders as an empty string.
pub fn field_values(track: &Track, store: Store, options: &FieldOptions) -> FieldValues {
    let release = &track.release;
    let limit = options.artists_limit;
    let short = options.artists_short_form.as_str();
    let padding = options.track_number_padding;

    FieldValues::from([
        ("track_id", track.id.to_string()),
        ("track_url", track.store_url(store)),
        ("track_name", track.full_name()),
        ("track_artists", track.artists.display(0, "")),
        ("track_remixers", track.remixers.display(0, "")),
        ("track_artists_limited", track.artists.display(limit, short)),
        ("track_remixers_limited", track.remixers.display(limit, short)),
        ("track_number", track.number.to_string()),
        (
            "track_number_with_padding",
            number_with_padding(track.number, release.track_count, padding),
        ),
        (
            "track_number_with_total",
            format!("{}/{}", track.number, release.track_count),
        ),
        ("track_genre", track.genre.name.clone()),
        (
            "track_subgenre",
            track
                .subgenre
                .as_ref()
                .map(|g| g.name.clone())
                .unwrap_or_default(),
        ),
        ("track_genre_with_subgenre", track.genre_with_subgenre("|")),
        ("track_subgenre_or_genre", track.subgenre_or_genre()),
        ("track_key", track.key.display(options.key_system)),
        ("track_bpm", track.bpm.to_string()),
        ("track_isrc", track.isrc.clone()),
        ("release_id", release.id.to_string()),
        ("release_url", release.store_url(store)),
        ("release_name", release.name.clone()),
        ("release_artists", release.artists.display(0, "")),
        ("release_remixers", release.remixers.display(0, "")),
        ("release_artists_limited", release.artists.display(limit, short)),
        ("release_remixers_limited", release.remixers.display(limit, short)),
        ("release_date", release.date.clone()),
        ("release_year", release.year()),
        ("release_track_count", release.track_count.to_string()),
        (
            "release_track_count_with_padding",
            number_with_padding(release.track_count, release.track_count, padding),
        ),
        ("release_catalog_number", release.catalog_number.clone()),
        ("release_upc", release.upc.clone()),
        ("release_label", release.label.name.clone()),
        ("release_label_url", release.label.store_url(store)),
    ])
}

/// Logical field to output identifier, for one container format.
pub type MappingTable = BTreeMap<String, String>;

/// Mapping tables keyed by container format (`"flac"`, `"m4a"`, `"default"`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagMappings(pub HashMap<String, MappingTable>);

impl TagMappings {
    /// Table for `format`, falling back to the default table.
    pub fn table_for(&self, format: &str) -> Result<&MappingTable> {
        self.0
            .get(format)
            .or_else(|| self.0.get(DEFAULT_MAPPING_KEY))
            .ok_or_else(|| Error::MappingNotFound {
                format: format.to_string(),
            })
    }

    /// Tables shipped when the configuration does not define any.
    pub fn builtin() -> Self {
        let flac = table(&[
            ("track_name", "TITLE"),
            ("track_artists", "ARTIST"),
            ("track_number", "TRACKNUMBER"),
            ("release_track_count", "TRACKTOTAL"),
            ("track_subgenre_or_genre", "GENRE"),
            ("track_key", "INITIALKEY"),
            ("track_bpm", "BPM"),
            ("track_isrc", "ISRC"),
            ("release_name", "ALBUM"),
            ("release_artists", "ALBUMARTIST"),
            ("release_date", "DATE"),
            ("release_catalog_number", "CATALOGNUMBER"),
            ("release_label", "LABEL"),
            ("release_upc", "BARCODE"),
        ]);
        let m4a = table(&[
            ("track_name", "title"),
            ("track_artists", "artist"),
            ("track_number_with_total", "track"),
            ("track_subgenre_or_genre", "genre"),
            ("release_name", "album"),
            ("release_artists", "album_artist"),
            ("release_date", "date"),
            ("release_label", "copyright"),
            ("track_key", "initialkey_raw"),
            ("track_bpm", "BPM_raw"),
            ("track_isrc", "ISRC_raw"),
            ("release_catalog_number", "CATALOGNUMBER_raw"),
        ]);
        Self(HashMap::from([
            ("flac".to_string(), flac),
            ("m4a".to_string(), m4a),
        ]))
    }
}

fn table(pairs: &[(&str, &str)]) -> MappingTable {
    pairs
        .iter()
        .map(|(field, tag)| (field.to_string(), tag.to_string()))
        .collect()
}

/// Tag fields ready for the tag writer, split by write path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedTags {
    pub standard: BTreeMap<String, String>,
    /// Non-standard tags, keyed by the identifier without its suffix.
    pub raw: BTreeMap<String, String>,
}

impl ResolvedTags {
    pub fn is_empty(&self) -> bool {
        self.standard.is_empty() && self.raw.is_empty()
    }

    pub fn len(&self) -> usize {
        self.standard.len() + self.raw.len()
    }
}

/// Resolve the tags to write into a `format` container.
pub fn resolve(values: &FieldValues, mappings: &TagMappings, format: &str) -> Result<ResolvedTags> {
    let table = mappings.table_for(format)?;
    let mut resolved = ResolvedTags::default();
    for (field, identifier) in table {
        let Some(value) = values.get(field.as_str()).filter(|v| !v.is_empty()) else {
            continue;
        };
        match identifier.strip_suffix(RAW_TAG_SUFFIX) {
            Some(raw) if !raw.is_empty() => {
                resolved.raw.insert(raw.to_string(), value.clone());
            }
            _ => {
                resolved.standard.insert(identifier.clone(), value.clone());
            }
        }
    }
    Ok(resolved)
}
