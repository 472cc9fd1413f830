//! Authenticated request dispatch.
//!
//! Wraps every authenticated call: attaches the session's Authorization
//! header, classifies failures into the store error taxonomy, and recovers
//! exactly once from an authorization rejection by refreshing the session.

use std::sync::Arc;

use tracing::debug;

use crate::api::transport::{HttpTransport, TransportRequest, TransportResponse};
use crate::auth::session::AuthSession;
use crate::error::{Error, Result, StoreErrorList};

/// Error code the store uses to signal that the authorization macaroon must
/// be refreshed.
const NEEDS_REFRESH_CODE: &str = "macaroon-needs-refresh";

pub struct RequestGateway {
    transport: Arc<dyn HttpTransport>,
    session: Arc<AuthSession>,
}

impl RequestGateway {
    pub fn new(transport: Arc<dyn HttpTransport>, session: Arc<AuthSession>) -> Self {
        Self { transport, session }
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// Send an authenticated request.
    ///
    /// A response rejecting the authorization triggers one session refresh
    /// and one retry; a second rejection is surfaced. Never more, so a store
    /// that rejects every token cannot trap the client in a retry loop.
    pub async fn request(&self, request: TransportRequest) -> Result<TransportResponse> {
        let credential = self.session.get_active_credential().await?;
        let authed = request
            .clone()
            .header("Authorization", AuthSession::header_for(&credential));
        let response = self.transport.send(authed).await?;
        if !Self::authorization_rejected(&response) {
            return Self::classify(response);
        }

        debug!("store rejected the authorization, refreshing once");
        let renewed = self.session.refresh_stale(&credential).await?;
        let retried = request.header("Authorization", AuthSession::header_for(&renewed));
        Self::classify(self.transport.send(retried).await?)
    }

    fn authorization_rejected(response: &TransportResponse) -> bool {
        if response.is_success() {
            return false;
        }
        response.status == 401
            || StoreErrorList::from_response_body(&response.body).contains(NEEDS_REFRESH_CODE)
    }

    /// Map non-success responses into the store error taxonomy.
    fn classify(response: TransportResponse) -> Result<TransportResponse> {
        if response.is_success() {
            Ok(response)
        } else {
            Err(Error::from_store_response(response.status, &response.body))
        }
    }
}
