//! Upload submission tracking.

pub mod tracker;

pub use tracker::{PollPolicy, UploadJob, UploadOutcome, UploadTracker};
