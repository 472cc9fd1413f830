//! Credential lifecycle: issuance, refresh and revocation.
//!
//! An `AuthSession` binds one credential to a (host, application) pair. It is
//! created unauthenticated, populated by `login` or by a previously persisted
//! or environment-provided credential, and consulted on every authenticated
//! request. Persistence goes through the backend resolved once at
//! construction.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::endpoints::{Endpoints, LoginRequest};
use crate::api::transport::{HttpTransport, TransportRequest};
use crate::auth::backend::{
    select_backend, EnvBackend, KeyringBackend, MemoryBackend, SecretBackend, StorageKey,
};
use crate::auth::creds::{self, Credential, MacaroonPair, Token};
use crate::config::{ClientConfig, StoreFamily};
use crate::error::{Error, Result};

/// Error code the store attaches to a refresh rejection for a revoked
/// session.
const REVOKED_CODE: &str = "macaroon-revoked";

/// Resolves the third-party caveat on a freshly issued root macaroon.
///
/// The store hands `login` a root macaroon carrying a caveat only an external
/// authority can discharge; implementations contact that authority and return
/// the discharge token. The session then binds the discharge to the root and,
/// where the family requires it, exchanges the pair for the final store
/// token.
#[async_trait]
pub trait Discharger: Send + Sync {
    async fn discharge(&self, root_macaroon: &str) -> Result<String>;
}

#[derive(Deserialize)]
struct TokenResponse {
    macaroon: String,
}

#[derive(Deserialize)]
struct RefreshResponse {
    discharge_macaroon: String,
}

pub struct AuthSession {
    application_name: String,
    host: String,
    base_url: String,
    auth_url: String,
    family: StoreFamily,
    endpoints: Endpoints,
    transport: Arc<dyn HttpTransport>,
    backend: Box<dyn SecretBackend>,
    refresh_gate: Mutex<()>,
}

impl AuthSession {
    /// Create a session, resolving the credential backend once.
    ///
    /// Preference order: the configured environment variable when set (read
    /// only, never persisted), an in-memory store for ephemeral sessions,
    /// then the system keyring with the opt-in file fallback.
    pub fn new(config: &ClientConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let host = config.host()?;
        let key = StorageKey::new(&config.application_name, &host);

        let backend: Box<dyn SecretBackend> = if let Some(value) = environment_override(config) {
            // Fail early on a garbage override instead of at first use.
            creds::decode(&value)?;
            debug!(
                variable = config.environment_auth.as_deref().unwrap_or_default(),
                "using environment-provided credentials"
            );
            Box::new(EnvBackend::new(value))
        } else if config.ephemeral {
            Box::new(MemoryBackend::new())
        } else {
            select_backend(
                KeyringBackend::availability(&key),
                &config.application_name,
                config.file_fallback,
            )?
        };

        Ok(Self::assemble(config, host, transport, backend))
    }

    /// Build a session over an explicit backend.
    pub fn with_backend(
        config: &ClientConfig,
        transport: Arc<dyn HttpTransport>,
        backend: Box<dyn SecretBackend>,
    ) -> Result<Self> {
        let host = config.host()?;
        Ok(Self::assemble(config, host, transport, backend))
    }

    fn assemble(
        config: &ClientConfig,
        host: String,
        transport: Arc<dyn HttpTransport>,
        backend: Box<dyn SecretBackend>,
    ) -> Self {
        Self {
            application_name: config.application_name.clone(),
            host,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_url: config.auth_base().trim_end_matches('/').to_string(),
            family: config.family,
            endpoints: config.family.endpoints(),
            transport,
            backend,
            refresh_gate: Mutex::new(()),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn storage_key(&self) -> StorageKey {
        StorageKey::new(&self.application_name, &self.host)
    }

    fn unavailable(&self) -> Error {
        Error::CredentialsUnavailable {
            application: self.application_name.clone(),
            host: self.host.clone(),
        }
    }

    fn revoked(&self) -> Error {
        Error::CredentialsRevoked {
            application: self.application_name.clone(),
            host: self.host.clone(),
        }
    }

    /// Read and decode the stored credential without touching the network.
    pub fn stored_credential(&self) -> Result<Credential> {
        match self.backend.read(&self.storage_key())? {
            Some(encoded) => creds::decode(&encoded),
            None => Err(self.unavailable()),
        }
    }

    /// The encoded credential string, suitable for an environment variable.
    pub fn export_credentials(&self) -> Result<String> {
        self.backend
            .read(&self.storage_key())?
            .ok_or_else(|| self.unavailable())
    }

    /// Validate and store an externally provided credential string, e.g. one
    /// exported from another machine.
    pub fn import_credentials(&self, encoded: &str, force: bool) -> Result<Credential> {
        let credential = creds::decode(encoded)?;
        if !force {
            self.ensure_no_credentials()?;
        }
        self.backend.write(&self.storage_key(), encoded.trim())?;
        Ok(credential)
    }

    /// Guard against clobbering a working session.
    ///
    /// Only an unexpired, decodable credential blocks a new login; expired or
    /// undecodable records are fair game to overwrite.
    fn ensure_no_credentials(&self) -> Result<()> {
        match self.backend.read(&self.storage_key())? {
            Some(encoded) => match creds::decode(&encoded) {
                Ok(credential) if !credential.is_expired() => {
                    Err(Error::CredentialsAlreadyAvailable {
                        application: self.application_name.clone(),
                        host: self.host.clone(),
                    })
                }
                Ok(_) => Ok(()),
                Err(_) => {
                    debug!("stored credential is not parseable, allowing login");
                    Ok(())
                }
            },
            None => Ok(()),
        }
    }

    fn store_credential(&self, credential: &Credential) -> Result<()> {
        let encoded = creds::encode(credential)?;
        debug!(
            backend = self.backend.name(),
            host = %self.host,
            "storing credential"
        );
        self.backend.write(&self.storage_key(), &encoded)
    }

    /// Obtain fresh credentials from the store.
    ///
    /// Three steps: request a root macaroon with the requested attenuations,
    /// have its third-party caveat discharged, and bind or exchange the
    /// result into the final store token, which is then persisted. Fails with
    /// `CredentialsAlreadyAvailable` while an unexpired credential exists,
    /// unless `force` re-login is requested.
    pub async fn login(
        &self,
        login: &LoginRequest,
        discharger: &dyn Discharger,
        force: bool,
    ) -> Result<Credential> {
        if !force {
            self.ensure_no_credentials()?;
        }

        let body = self.endpoints.token_request(login)?;
        let request = TransportRequest::post(format!("{}{}", self.base_url, self.endpoints.tokens))
            .header("Accept", "application/json")
            .json(body);
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(Error::from_store_response(response.status, &response.body));
        }
        let root = response.json::<TokenResponse>()?.macaroon;

        let discharge = discharger.discharge(&root).await?;
        let token = self.bind_token(&root, &discharge).await?;

        let credential = Credential::issue(token, login);
        self.store_credential(&credential)?;
        Ok(credential)
    }

    /// Turn a (root, discharge) pair into the token the store accepts.
    ///
    /// SSO-fronted stores use the bound pair directly; the package store
    /// wants it exchanged for a single store-authorized macaroon.
    async fn bind_token(&self, root: &str, discharge: &str) -> Result<Token> {
        match self.family {
            StoreFamily::SsoStore => Ok(Token::SsoMacaroon(MacaroonPair {
                root: root.to_string(),
                discharge: discharge.to_string(),
            })),
            StoreFamily::PackageStore => {
                let bundle = serde_json::to_string(&[root, discharge])
                    .map_err(|e| Error::InvalidRequest(e.to_string()))?;
                let request = TransportRequest::post(format!(
                    "{}{}",
                    self.base_url, self.endpoints.tokens_exchange
                ))
                .header("Macaroons", URL_SAFE.encode(bundle))
                .header("Accept", "application/json")
                .json(serde_json::json!({}));
                let response = self.transport.send(request).await?;
                if !response.is_success() {
                    return Err(Error::from_store_response(response.status, &response.body));
                }
                Ok(Token::Macaroon(response.json::<TokenResponse>()?.macaroon))
            }
        }
    }

    /// Current credential, refreshed first when its validity window has
    /// elapsed and the store family supports refresh.
    ///
    /// An expired credential of a non-refreshable family is returned as-is;
    /// the store's rejection then drives the re-login error path.
    pub async fn get_active_credential(&self) -> Result<Credential> {
        let credential = self.stored_credential()?;
        if credential.is_expired() && self.endpoints.tokens_refresh.is_some() {
            return self.refresh_stale(&credential).await;
        }
        Ok(credential)
    }

    /// Exchange the stored credential for a renewed one.
    ///
    /// Refreshing an unexpired credential is a no-op returning the stored
    /// value unchanged.
    pub async fn refresh(&self) -> Result<Credential> {
        let current = self.stored_credential()?;
        if !current.is_expired() {
            return Ok(current);
        }
        self.refresh_stale(&current).await
    }

    /// Renew `observed` unless another caller already replaced it.
    ///
    /// At most one exchange is in flight per session; a caller arriving
    /// while one runs waits on the gate and reuses its result instead of
    /// issuing a duplicate exchange.
    pub(crate) async fn refresh_stale(&self, observed: &Credential) -> Result<Credential> {
        let _gate = self.refresh_gate.lock().await;

        // Another caller may have finished an exchange while this one waited.
        let current = self.stored_credential()?;
        if current != *observed {
            return Ok(current);
        }

        let Some(refresh_path) = self.endpoints.tokens_refresh else {
            return Err(self.revoked());
        };
        let Token::SsoMacaroon(pair) = &current.token else {
            // Single macaroons cannot be renewed client-side.
            return Err(self.revoked());
        };

        debug!(host = %self.host, "refreshing store credential");
        let request = TransportRequest::post(format!("{}{}", self.auth_url, refresh_path))
            .header("Accept", "application/json")
            .json(serde_json::json!({ "discharge_macaroon": pair.discharge }));
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            let err = Error::from_store_response(response.status, &response.body);
            if let Error::StoreServer { status, error_list } = &err {
                if *status == 401 || error_list.contains(REVOKED_CODE) {
                    return Err(self.revoked());
                }
            }
            return Err(err);
        }

        let renewed: RefreshResponse = response.json()?;
        let credential =
            current.renewed(Token::SsoMacaroon(pair.with_discharge(renewed.discharge_macaroon)));
        self.store_credential(&credential)?;
        Ok(credential)
    }

    /// Authorization header value for a credential.
    pub(crate) fn header_for(credential: &Credential) -> String {
        match &credential.token {
            Token::Macaroon(token) => format!("Macaroon {token}"),
            Token::SsoMacaroon(pair) => {
                format!("Macaroon root={}, discharge={}", pair.root, pair.discharge)
            }
        }
    }

    /// Authorization header for the active credential.
    pub async fn authorization_header(&self) -> Result<String> {
        Ok(Self::header_for(&self.get_active_credential().await?))
    }

    /// Drop this session's credentials.
    ///
    /// Revocation at the store is best effort; local deletion always
    /// follows, even when the revocation call fails, so a transient network
    /// error cannot leave credentials behind after a user asked for logout.
    pub async fn logout(&self) -> Result<()> {
        let key = self.storage_key();
        match self.stored_credential() {
            Ok(credential) => {
                if let Some(revoke_path) = self.endpoints.tokens_revoke {
                    let request =
                        TransportRequest::post(format!("{}{}", self.base_url, revoke_path))
                            .header("Authorization", Self::header_for(&credential))
                            .header("Accept", "application/json")
                            .json(serde_json::json!({}));
                    match self.transport.send(request).await {
                        Ok(response) if response.is_success() => {
                            debug!(host = %self.host, "revoked store credential");
                        }
                        Ok(response) => {
                            warn!(status = response.status, "store-side revocation failed");
                        }
                        Err(err) => {
                            warn!(error = %err, "store-side revocation failed");
                        }
                    }
                }
                self.backend.delete(&key)
            }
            Err(err @ Error::CredentialsUnavailable { .. }) => Err(err),
            // An undecodable record is still deleted; logout leaves nothing
            // behind.
            Err(_) => self.backend.delete(&key),
        }
    }
}

fn environment_override(config: &ClientConfig) -> Option<String> {
    let variable = config.environment_auth.as_deref()?;
    match std::env::var(variable) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}
