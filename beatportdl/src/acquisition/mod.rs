//! Acquisition: quality tiers, media signatures and the per-track transfer
//! state machine (`Unresolved -> DirectDownload | SegmentedStream ->
//! Acquired | Failed`).

pub mod quality;
pub mod selector;

pub use quality::{MediaSignature, Quality};
pub use selector::{AcquisitionSelector, JobState, TransferJob, TransferPlan, TransferStrategy};
