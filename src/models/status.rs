//! Upload review status models.

use serde::{Deserialize, Serialize};

/// Processing state reported for an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadStatus {
    Submitted,
    Processing,
    Approved,
    Rejected,
    Errored,
}

impl UploadStatus {
    /// Whether polling can stop at this status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UploadStatus::Submitted | UploadStatus::Processing)
    }
}

/// One review failure attached to an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

/// Review record for one upload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadReview {
    #[serde(rename = "upload-id")]
    pub upload_id: String,
    pub status: UploadStatus,
    /// Revision number assigned on approval.
    #[serde(default)]
    pub revision: Option<u64>,
    #[serde(default)]
    pub errors: Option<Vec<ReviewError>>,
}

/// Status endpoint payload: reviews for the polled uploads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusResponse {
    pub revisions: Vec<UploadReview>,
}
