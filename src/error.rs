//! Error taxonomy for store interactions.
//!
//! Callers branch on these kinds: an interactive login flow needs to tell a
//! second-factor challenge apart from a revoked token, and "credentials are
//! garbage" apart from "credentials are simply absent", so failures are never
//! collapsed into a generic error.

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// One structured error reported by the store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreErrorItem {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Error list returned from the store.
///
/// Stores may echo the same failure at both the transport and the
/// application-body level; insertion deduplicates identical payloads so each
/// failure is reported exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreErrorList {
    items: Vec<StoreErrorItem>,
}

impl StoreErrorList {
    pub fn push(&mut self, item: StoreErrorItem) {
        if !self.items.contains(&item) {
            self.items.push(item);
        }
    }

    /// Whether an error with this machine-readable code is present.
    pub fn contains(&self, code: &str) -> bool {
        self.items.iter().any(|e| e.code.as_deref() == Some(code))
    }

    /// Look up the error carrying this code.
    pub fn get(&self, code: &str) -> Option<&StoreErrorItem> {
        self.items.iter().find(|e| e.code.as_deref() == Some(code))
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoreErrorItem> {
        self.items.iter()
    }

    /// Extract the error list from a response body.
    ///
    /// Newer stores use `error-list`, older ones `error_list`; both are
    /// accepted. A body without either yields an empty list.
    pub fn from_response_body(body: &str) -> Self {
        let mut list = Self::default();
        let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
            return list;
        };
        for key in ["error-list", "error_list"] {
            if let Some(entries) = value.get(key).and_then(|v| v.as_array()) {
                for entry in entries {
                    if let Ok(item) = serde_json::from_value::<StoreErrorItem>(entry.clone()) {
                        list.push(item);
                    }
                }
            }
        }
        list
    }
}

impl fmt::Display for StoreErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self
            .items
            .iter()
            .map(|e| match &e.code {
                Some(code) => format!("- {}: {}", code, e.message),
                None => format!("- {}", e.message),
            })
            .collect();
        write!(f, "{}", lines.join("\n"))
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// No usable credential found anywhere (environment, keyring, file).
    #[error("no credentials found for {application:?} on {host:?}")]
    CredentialsUnavailable { application: String, host: String },

    /// Login attempted while an unexpired credential exists for the session.
    #[error("credentials found for {application:?} on {host:?}")]
    CredentialsAlreadyAvailable { application: String, host: String },

    /// A stored or environment-provided credential string failed decoding.
    #[error("credentials could not be parsed: {0}")]
    CredentialsNotParseable(String),

    /// The store refused to renew the session; a fresh login is required.
    #[error("credentials for {application:?} on {host:?} can no longer be refreshed, log in again")]
    CredentialsRevoked { application: String, host: String },

    /// The system secret store exists but cannot be unlocked. Never
    /// downgraded to the file fallback.
    #[error("the system secret store is locked or access was denied")]
    SecretStoreLocked,

    #[error("no secret store found to store or retrieve credentials from")]
    NoSecretStore,

    #[error("credential storage i/o error: {0}")]
    Storage(#[from] std::io::Error),

    /// Transport-level failure: DNS, connection, timeout.
    #[error("network error: {0}")]
    Network(String),

    /// The store returned a structured application-level error list.
    #[error("store operation failed with status {status}:\n{error_list}")]
    StoreServer { status: u16, error_list: StoreErrorList },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid response from store: {0}")]
    InvalidResponse(String),

    /// The discharge authority did not hand back a token in time.
    #[error("timed out waiting for discharge token from {url:?}")]
    DischargeTimeout { url: String },
}

impl Error {
    /// Build a store error from a non-success response, folding any
    /// structured error list out of the body.
    pub(crate) fn from_store_response(status: u16, body: &str) -> Self {
        let mut error_list = StoreErrorList::from_response_body(body);
        if error_list.is_empty() {
            error_list.push(StoreErrorItem {
                code: None,
                message: format!("issue encountered while processing the request: [{status}]"),
            });
        }
        Error::StoreServer { status, error_list }
    }
}
