//! Wire models shared across endpoints.

pub mod account;
pub mod revision;
pub mod status;

pub use account::{Account, WhoamiResponse};
pub use revision::{ReleaseRequest, RevisionRequest, RevisionResponse, UploadAck};
pub use status::{ReviewError, StatusResponse, UploadReview, UploadStatus};
