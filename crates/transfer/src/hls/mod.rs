//! Segmented (HLS) transfers: manifest resolution, AES-128 decryption and
//! in-order reassembly.

mod assembler;
pub mod decryption;
pub mod manifest;
pub mod reorder;

pub use assembler::SegmentedTransfer;
pub use decryption::{DecryptionOffloader, KeyStore, fetch_keys};
pub use manifest::{Segment, SegmentKey, SegmentPlan, resolve_manifest};
pub use reorder::ReorderBuffer;
