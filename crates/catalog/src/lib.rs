//! Music catalog access: entity model, store link parsing, the naming engine
//! and the catalog service client.

pub mod client;
pub mod error;
pub mod link;
pub mod model;
pub mod naming;
pub mod sanitize;

pub use client::{Catalog, HttpCatalog, HttpCatalogConfig};
pub use error::CatalogError;
pub use link::{Link, LinkType, Store};
pub use model::{
    Artist, Artists, BpmRange, Chart, DEFAULT_COVER_SIZE, DownloadDescriptor, Genre, Image, Key,
    KeySystem, Label, Playlist, PlaylistItem, Release, Track,
};
pub use naming::{Nameable, NamingPreferences, NumberPadding, number_with_padding, render};
pub use sanitize::{is_valid_whitespace_replacement, sanitize_filename, sanitize_segment};
