//! Tag mapping and cover handling.

pub mod cover;
pub mod mapper;

pub use cover::{COVER_FILENAME, CoverPolicy};
pub use mapper::{
    DEFAULT_MAPPING_KEY, FieldOptions, FieldValues, MappingTable, RAW_TAG_SUFFIX, ResolvedTags,
    TagMappings, field_values, resolve,
};
