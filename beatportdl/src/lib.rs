//! beatportdl: concurrent acquisition, tagging and placement of catalog tracks.

pub mod acquisition;
pub mod batch;
pub mod cli;
pub mod config;
pub mod delivery;
pub mod error;
pub mod governor;
pub mod logging;
pub mod media;
pub mod pipeline;
pub mod progress;
pub mod tagging;
pub mod utils;

pub use error::{Error, PipelineError, Result, Step};
