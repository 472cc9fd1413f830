//! Client configuration.
//!
//! A `ClientConfig` names the store (base URLs and endpoint family), the
//! application identity used as the credential-storage key, and the optional
//! environment/ephemeral credential modes.

use serde::{Deserialize, Serialize};

use crate::api::endpoints::{Endpoints, PACKAGE_STORE, SSO_STORE};
use crate::error::{Error, Result};

/// Supported endpoint families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreFamily {
    /// Direct package store with server-side token exchange.
    PackageStore,
    /// Store fronted by the federated SSO service, with refreshable tokens.
    SsoStore,
}

impl StoreFamily {
    pub fn endpoints(&self) -> Endpoints {
        match self {
            StoreFamily::PackageStore => PACKAGE_STORE,
            StoreFamily::SsoStore => SSO_STORE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the store API.
    pub base_url: String,
    /// Base URL for blob storage uploads.
    pub storage_base_url: String,
    /// Authentication service base; the store's own base URL when absent.
    #[serde(default)]
    pub auth_url: Option<String>,
    pub family: StoreFamily,
    /// Application name; one credential is stored per (host, application).
    pub application_name: String,
    pub user_agent: String,
    /// Environment variable supplying a serialized credential. When set it
    /// overrides every other backend and disables persistence.
    #[serde(default)]
    pub environment_auth: Option<String>,
    /// Keep credentials in memory only; nothing is persisted.
    #[serde(default)]
    pub ephemeral: bool,
    /// Allow falling back to a plaintext file when the keyring is
    /// unavailable.
    #[serde(default)]
    pub file_fallback: bool,
}

impl ClientConfig {
    pub fn new(
        base_url: impl Into<String>,
        storage_base_url: impl Into<String>,
        family: StoreFamily,
        application_name: impl Into<String>,
    ) -> Self {
        let application_name = application_name.into();
        let user_agent = format!("{}/{}", application_name, env!("CARGO_PKG_VERSION"));
        Self {
            base_url: base_url.into(),
            storage_base_url: storage_base_url.into(),
            auth_url: None,
            family,
            application_name,
            user_agent,
            environment_auth: None,
            ephemeral: false,
            file_fallback: false,
        }
    }

    /// Normalized network location of the store: host with an explicit port
    /// kept, scheme and path dropped. Two base URLs differing only by path
    /// resolve to the same stored credential.
    pub fn host(&self) -> Result<String> {
        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| Error::InvalidRequest(format!("invalid base url: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidRequest("base url has no host".to_string()))?;
        Ok(match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    pub fn auth_base(&self) -> &str {
        self.auth_url.as_deref().unwrap_or(&self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_drops_scheme_and_path() {
        let config = ClientConfig::new(
            "https://api.store.example.com/v1/extra",
            "https://storage.example.com",
            StoreFamily::PackageStore,
            "pkgtool",
        );
        assert_eq!(
            config.host().expect("host should parse"),
            "api.store.example.com"
        );
    }

    #[test]
    fn test_host_keeps_explicit_port() {
        let config = ClientConfig::new(
            "https://localhost:8443/api",
            "https://localhost:8443",
            StoreFamily::PackageStore,
            "pkgtool",
        );
        assert_eq!(config.host().expect("host should parse"), "localhost:8443");
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let config = ClientConfig::new(
            "not a url",
            "https://storage.example.com",
            StoreFamily::PackageStore,
            "pkgtool",
        );
        assert!(config.host().is_err());
    }

    #[test]
    fn test_auth_base_defaults_to_store() {
        let mut config = ClientConfig::new(
            "https://api.store.example.com",
            "https://storage.example.com",
            StoreFamily::SsoStore,
            "pkgtool",
        );
        assert_eq!(config.auth_base(), "https://api.store.example.com");
        config.auth_url = Some("https://login.example.com".to_string());
        assert_eq!(config.auth_base(), "https://login.example.com");
    }
}
