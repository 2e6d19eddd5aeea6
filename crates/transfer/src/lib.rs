//! Media transfer engine.
//!
//! Two strategies write one temp file each: a direct progressive download
//! ([`download_to_file`]) and a segmented, AES-128 encrypted HLS transfer
//! ([`SegmentedTransfer`]) that reassembles segments in manifest order.

pub mod config;
pub mod direct;
pub mod error;
pub mod hls;
pub mod progress;
pub mod retry;
pub mod source;

#[cfg(test)]
mod testing;

pub use config::TransferConfig;
pub use direct::download_to_file;
pub use error::TransferError;
pub use hls::SegmentedTransfer;
pub use progress::{ProgressSnapshot, TransferProgress};
pub use retry::RetryPolicy;
pub use source::{BodyStream, ByteRange, ByteSource, HttpSource};
