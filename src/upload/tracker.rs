//! Upload completion tracking.
//!
//! After the store acknowledges an upload it reviews the blob
//! asynchronously. This module polls the review status URL until the store
//! reports a terminal state, and maps every terminal outcome (rejection
//! included) to data rather than an error.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::api::gateway::RequestGateway;
use crate::api::transport::TransportRequest;
use crate::error::{Error, Result};
use crate::models::status::{ReviewError, StatusResponse, UploadStatus};

/// Poll interval between status requests.
/// Server-side review time dominates the wait; 3s keeps the request load low
/// without adding noticeable latency.
const POLL_INTERVAL_SECS: u64 = 3;

/// Consecutive transport failures tolerated before giving up. The interval
/// stays fixed: review latency, not network congestion, is what we wait on.
const MAX_POLL_RETRIES: u32 = 3;

/// Polling policy, explicit so tests can assert exact call counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_transport_retries: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(POLL_INTERVAL_SECS),
            max_transport_retries: MAX_POLL_RETRIES,
        }
    }
}

/// One in-flight upload and its last observed state.
///
/// Mutated only by the polling loop; once `status` is terminal the job is
/// done. A job that timed out waiting can be polled again later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    /// Tracking handle assigned by the store.
    pub upload_id: String,
    pub name: String,
    pub resource: Option<String>,
    /// Review status endpoint for this upload.
    pub status_url: String,
    pub status: UploadStatus,
}

impl UploadJob {
    pub fn new(
        upload_id: impl Into<String>,
        name: impl Into<String>,
        resource: Option<String>,
        status_url: impl Into<String>,
    ) -> Self {
        Self {
            upload_id: upload_id.into(),
            name: name.into(),
            resource,
            status_url: status_url.into(),
            status: UploadStatus::Submitted,
        }
    }
}

/// Terminal (or deadline) outcome of an upload review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Review passed; the store assigned this revision number.
    Approved { revision: u64 },
    /// Review failed. An expected business outcome, not a systemic failure;
    /// the caller decides whether it is fatal.
    Rejected(Vec<ReviewError>),
    /// The store's review pipeline itself errored while processing.
    Errored(Vec<ReviewError>),
    /// Still processing when the caller's deadline elapsed; polling can
    /// resume later with the same job.
    Pending,
}

pub struct UploadTracker {
    gateway: Arc<RequestGateway>,
    policy: PollPolicy,
}

impl UploadTracker {
    pub fn new(gateway: Arc<RequestGateway>) -> Self {
        Self::with_policy(gateway, PollPolicy::default())
    }

    pub fn with_policy(gateway: Arc<RequestGateway>, policy: PollPolicy) -> Self {
        Self { gateway, policy }
    }

    /// Poll until the review reaches a terminal state or `deadline` elapses.
    ///
    /// Transport failures are retried up to the policy's bound with the
    /// interval unchanged; a store-reported terminal error stops polling
    /// immediately and is returned as data.
    pub async fn wait(
        &self,
        job: &mut UploadJob,
        deadline: Option<Duration>,
    ) -> Result<UploadOutcome> {
        let started = Instant::now();
        let mut failures: u32 = 0;
        loop {
            match self.poll_once(job).await {
                Ok(Some(outcome)) => return Ok(outcome),
                Ok(None) => {
                    failures = 0;
                }
                Err(err @ Error::Network(_)) => {
                    failures += 1;
                    if failures > self.policy.max_transport_retries {
                        return Err(err);
                    }
                    warn!(error = %err, retry = failures, "status poll failed, retrying");
                }
                Err(err) => return Err(err),
            }

            if let Some(limit) = deadline {
                if started.elapsed() + self.policy.interval > limit {
                    debug!(upload_id = %job.upload_id, "deadline reached while still processing");
                    return Ok(UploadOutcome::Pending);
                }
            }
            sleep(self.policy.interval).await;
        }
    }

    /// One status request; `None` while the store is still processing.
    async fn poll_once(&self, job: &mut UploadJob) -> Result<Option<UploadOutcome>> {
        let response = self
            .gateway
            .request(TransportRequest::get(job.status_url.clone()))
            .await?;
        let status: StatusResponse = response.json()?;
        let review = status
            .revisions
            .iter()
            .find(|r| r.upload_id == job.upload_id)
            .ok_or_else(|| {
                Error::InvalidResponse(format!("no review for upload {:?}", job.upload_id))
            })?;

        job.status = review.status;
        debug!(upload_id = %job.upload_id, status = ?review.status, "upload review status");

        match review.status {
            UploadStatus::Submitted | UploadStatus::Processing => Ok(None),
            UploadStatus::Approved => {
                let revision = review.revision.ok_or_else(|| {
                    Error::InvalidResponse("approved review without a revision number".to_string())
                })?;
                Ok(Some(UploadOutcome::Approved { revision }))
            }
            UploadStatus::Rejected => Ok(Some(UploadOutcome::Rejected(
                review.errors.clone().unwrap_or_default(),
            ))),
            UploadStatus::Errored => Ok(Some(UploadOutcome::Errored(
                review.errors.clone().unwrap_or_default(),
            ))),
        }
    }
}
