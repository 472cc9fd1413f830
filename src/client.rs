//! Store client facade tying the session, gateway and tracker together.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::api::endpoints::{Endpoints, LoginRequest};
use crate::api::gateway::RequestGateway;
use crate::api::transport::{HttpTransport, ReqwestTransport, TransportRequest};
use crate::auth::session::{AuthSession, Discharger};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::models::account::WhoamiResponse;
use crate::models::revision::{ReleaseRequest, RevisionRequest, RevisionResponse, UploadAck};
use crate::upload::tracker::{PollPolicy, UploadJob, UploadOutcome, UploadTracker};

/// Client for one store, bound to one (host, application) credential.
pub struct StoreClient {
    config: ClientConfig,
    endpoints: Endpoints,
    transport: Arc<dyn HttpTransport>,
    session: Arc<AuthSession>,
    gateway: Arc<RequestGateway>,
}

impl StoreClient {
    /// Build a client, resolving credential storage for the configured
    /// (host, application) pair.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::new(config.user_agent.clone())?);
        Self::with_transport(config, transport)
    }

    /// Build a client over an explicit transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let endpoints = config.family.endpoints();
        let session = Arc::new(AuthSession::new(&config, transport.clone())?);
        let gateway = Arc::new(RequestGateway::new(transport.clone(), session.clone()));
        Ok(Self {
            config,
            endpoints,
            transport,
            session,
            gateway,
        })
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
        }
    }

    /// Log in and return the exportable credential string.
    ///
    /// Set `force` to replace a working session; otherwise a live credential
    /// fails the attempt with `CredentialsAlreadyAvailable`.
    pub async fn login(
        &self,
        login: &LoginRequest,
        discharger: &dyn Discharger,
        force: bool,
    ) -> Result<String> {
        self.session.login(login, discharger, force).await?;
        self.session.export_credentials()
    }

    /// Identity and attenuations behind the current credentials.
    pub async fn whoami(&self) -> Result<WhoamiResponse> {
        let response = self
            .gateway
            .request(TransportRequest::get(self.url(self.endpoints.whoami)))
            .await?;
        response.json()
    }

    /// Revoke (best effort) and locally delete this session's credentials.
    pub async fn logout(&self) -> Result<()> {
        self.session.logout().await
    }

    /// Upload a file to blob storage, returning the store's upload id.
    ///
    /// The storage service reports failures in-band; a `successful: false`
    /// acknowledgement is an error even on HTTP 200.
    pub async fn upload_file(&self, filepath: &Path) -> Result<String> {
        let request = TransportRequest::post(format!(
            "{}{}",
            self.config.storage_base_url.trim_end_matches('/'),
            self.endpoints.upload
        ))
        .header("Accept", "application/json")
        .file(filepath);
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(Error::from_store_response(response.status, &response.body));
        }
        let ack: UploadAck = response.json()?;
        if !ack.successful {
            return Err(Error::InvalidResponse(format!(
                "storage rejected the upload: {}",
                response.body
            )));
        }
        let upload_id = ack
            .upload_id
            .ok_or_else(|| Error::InvalidResponse("upload ack without an upload_id".to_string()))?;
        debug!(path = %filepath.display(), upload_id = %upload_id, "upload finished");
        Ok(upload_id)
    }

    /// Notify the store of an uploaded package revision; returns the job to
    /// track review completion.
    pub async fn notify_revision(&self, name: &str, upload_id: &str) -> Result<UploadJob> {
        let body = serde_json::to_value(RevisionRequest {
            upload_id: upload_id.to_string(),
        })
        .map_err(|e| Error::InvalidRequest(e.to_string()))?;
        let response = self
            .gateway
            .request(
                TransportRequest::post(self.url(&self.endpoints.revisions_path(name))).json(body),
            )
            .await?;
        let revision: RevisionResponse = response.json()?;
        Ok(UploadJob::new(
            upload_id,
            name,
            None,
            self.url(&revision.status_url),
        ))
    }

    /// Attach an uploaded blob to a named resource of a package.
    pub async fn push_resource(
        &self,
        name: &str,
        resource: &str,
        upload_id: &str,
    ) -> Result<UploadJob> {
        let body = serde_json::to_value(RevisionRequest {
            upload_id: upload_id.to_string(),
        })
        .map_err(|e| Error::InvalidRequest(e.to_string()))?;
        let response = self
            .gateway
            .request(
                TransportRequest::post(
                    self.url(&self.endpoints.resource_revisions_path(name, resource)),
                )
                .json(body),
            )
            .await?;
        let revision: RevisionResponse = response.json()?;
        Ok(UploadJob::new(
            upload_id,
            name,
            Some(resource.to_string()),
            self.url(&revision.status_url),
        ))
    }

    /// Poll an upload job to completion with the default policy.
    pub async fn wait_for_review(
        &self,
        job: &mut UploadJob,
        deadline: Option<Duration>,
    ) -> Result<UploadOutcome> {
        self.tracker(PollPolicy::default()).wait(job, deadline).await
    }

    /// Tracker over this client's gateway with an explicit policy.
    pub fn tracker(&self, policy: PollPolicy) -> UploadTracker {
        UploadTracker::with_policy(self.gateway.clone(), policy)
    }

    /// Release revisions of `name` into channels.
    pub async fn release(&self, name: &str, requests: &[ReleaseRequest]) -> Result<()> {
        let body = serde_json::to_value(requests).map_err(|e| Error::InvalidRequest(e.to_string()))?;
        self.gateway
            .request(
                TransportRequest::post(self.url(&self.endpoints.releases_path(name))).json(body),
            )
            .await?;
        Ok(())
    }

    /// Current channel map for `name`, as reported by the store.
    ///
    /// Returned unparsed; release payloads differ per store family and their
    /// schemas are the caller's concern.
    pub async fn list_releases(&self, name: &str) -> Result<serde_json::Value> {
        let response = self
            .gateway
            .request(TransportRequest::get(
                self.url(&self.endpoints.releases_path(name)),
            ))
            .await?;
        response.json()
    }
}
