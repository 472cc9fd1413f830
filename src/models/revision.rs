//! Revision and release request/response models.

use serde::{Deserialize, Serialize};

/// Request to register an uploaded blob as a new revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionRequest {
    #[serde(rename = "upload-id")]
    pub upload_id: String,
}

/// Acknowledgement carrying the tracking handle for review polling.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RevisionResponse {
    #[serde(rename = "status-url")]
    pub status_url: String,
}

/// One release operation: a revision into a channel. A missing revision
/// closes the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseRequest {
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
}

/// Acknowledgement from the storage service for an uploaded blob.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadAck {
    pub successful: bool,
    #[serde(default)]
    pub upload_id: Option<String>,
}
