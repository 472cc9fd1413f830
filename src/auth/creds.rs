//! Credential payloads and their storage encoding.
//!
//! Credentials are stored and exported as base64 text wrapping a small
//! versioned JSON document. The `t` tag is the version discriminator. Two
//! legacy layouts from earlier releases still decode: a tagged token without
//! scope metadata, and a raw macaroon string that predates the envelope.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::api::endpoints::LoginRequest;
use crate::auth::Permission;
use crate::error::{Error, Result};

/// Root and discharge macaroon pair used by SSO-fronted stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacaroonPair {
    #[serde(rename = "r")]
    pub root: String,
    #[serde(rename = "d")]
    pub discharge: String,
}

impl MacaroonPair {
    /// Copy of this pair with a renewed discharge macaroon.
    pub fn with_discharge(&self, discharge: impl Into<String>) -> Self {
        Self {
            root: self.root.clone(),
            discharge: discharge.into(),
        }
    }
}

/// Authorization token carried by a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Token {
    /// Store-authorized macaroon, ready for an Authorization header.
    #[serde(rename = "macaroon")]
    Macaroon(String),
    /// Root macaroon plus its third-party discharge.
    #[serde(rename = "sso-macaroon")]
    SsoMacaroon(MacaroonPair),
}

/// An issued authorization payload with its scope and validity window.
///
/// Immutable once issued; refresh produces a new `Credential`, never mutates
/// one in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(flatten)]
    pub token: Token,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<Permission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packages: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
    #[serde(rename = "issued-at", default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(rename = "expires-at", default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Build a freshly issued credential scoped per the login request.
    pub fn issue(token: Token, login: &LoginRequest) -> Self {
        let issued_at = Utc::now();
        Self {
            token,
            permissions: login.permissions.clone(),
            packages: login
                .packages
                .as_ref()
                .map(|packages| packages.iter().map(|p| p.name.clone()).collect()),
            channels: login.channels.clone(),
            issued_at: Some(issued_at),
            expires_at: Some(issued_at + Duration::seconds(login.ttl as i64)),
        }
    }

    /// New credential carrying a renewed token, same scope, with the
    /// validity window restarted.
    pub fn renewed(&self, token: Token) -> Self {
        let issued_at = Utc::now();
        let window = match (self.issued_at, self.expires_at) {
            (Some(issued), Some(expires)) => Some(expires - issued),
            _ => None,
        };
        Self {
            token,
            permissions: self.permissions.clone(),
            packages: self.packages.clone(),
            channels: self.channels.clone(),
            issued_at: Some(issued_at),
            expires_at: window.map(|w| issued_at + w),
        }
    }

    /// Whether the validity window has elapsed.
    ///
    /// Credentials decoded from legacy formats have no recorded window and
    /// never expire client-side; the store signals refresh for those.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() > expires_at,
            None => false,
        }
    }
}

/// Encode a credential for storage or export through an environment variable.
pub fn encode(credential: &Credential) -> Result<String> {
    let payload = serde_json::to_string(credential)
        .map_err(|e| Error::CredentialsNotParseable(format!("failed to encode credential: {e}")))?;
    Ok(BASE64.encode(payload))
}

/// Decode a stored or environment-provided credential string.
///
/// Accepts the current format and both legacy layouts. Anything else is
/// `Error::CredentialsNotParseable`, kept distinct from the absence of a
/// stored record.
pub fn decode(encoded: &str) -> Result<Credential> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| Error::CredentialsNotParseable(format!("invalid base64: {e}")))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| Error::CredentialsNotParseable("payload is not valid UTF-8".to_string()))?;
    decode_payload(&text)
}

fn decode_payload(text: &str) -> Result<Credential> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) if value.is_object() => {
            if value.get("t").is_some() {
                // Current format, or the tagged legacy layout whose missing
                // metadata fields default to unknown.
                serde_json::from_value(value).map_err(|e| {
                    Error::CredentialsNotParseable(format!("unknown credential layout: {e}"))
                })
            } else if value.get("r").is_some() && value.get("d").is_some() {
                // Oldest SSO layout: the bare macaroon pair, no envelope.
                let pair: MacaroonPair = serde_json::from_value(value).map_err(|e| {
                    Error::CredentialsNotParseable(format!("invalid macaroon pair: {e}"))
                })?;
                Ok(untagged_legacy(Token::SsoMacaroon(pair)))
            } else {
                Err(Error::CredentialsNotParseable(
                    "unknown credential layout".to_string(),
                ))
            }
        }
        Ok(_) => Err(Error::CredentialsNotParseable(
            "unknown credential layout".to_string(),
        )),
        // A raw macaroon from the oldest releases is not JSON at all.
        Err(_) => Ok(untagged_legacy(Token::Macaroon(text.to_string()))),
    }
}

fn untagged_legacy(token: Token) -> Credential {
    Credential {
        token,
        permissions: Vec::new(),
        packages: None,
        channels: None,
        issued_at: None,
        expires_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::endpoints::Package;

    fn login_request() -> LoginRequest {
        LoginRequest {
            permissions: vec![Permission::PackageAccess, Permission::PackagePush],
            description: "pkgstore tests".to_string(),
            ttl: 3600,
            packages: Some(vec![Package {
                name: "hello-world".to_string(),
                package_type: "package".to_string(),
            }]),
            channels: Some(vec!["stable".to_string()]),
        }
    }

    #[test]
    fn test_current_format_round_trips() {
        let credential = Credential::issue(
            Token::Macaroon("MDAxY2xvY2F0aW9u".to_string()),
            &login_request(),
        );
        let encoded = encode(&credential).expect("credential should encode");
        let decoded = decode(&encoded).expect("credential should decode");
        assert_eq!(decoded, credential);
    }

    #[test]
    fn test_sso_pair_round_trips() {
        let credential = Credential::issue(
            Token::SsoMacaroon(MacaroonPair {
                root: "root-macaroon".to_string(),
                discharge: "discharge-macaroon".to_string(),
            }),
            &login_request(),
        );
        let encoded = encode(&credential).expect("credential should encode");
        assert_eq!(decode(&encoded).expect("credential should decode"), credential);
    }

    #[test]
    fn test_decodes_legacy_raw_macaroon() {
        let encoded = BASE64.encode("MDAxY2xvY2F0aW9uIGV4YW1wbGU");
        let decoded = decode(&encoded).expect("legacy credential should decode");
        assert_eq!(
            decoded.token,
            Token::Macaroon("MDAxY2xvY2F0aW9uIGV4YW1wbGU".to_string())
        );
        assert!(decoded.issued_at.is_none());
        assert!(!decoded.is_expired());
    }

    #[test]
    fn test_decodes_legacy_tagged_token_without_metadata() {
        let encoded = BASE64.encode(r#"{"t": "macaroon", "v": "stored-long-ago"}"#);
        let decoded = decode(&encoded).expect("legacy credential should decode");
        assert_eq!(decoded.token, Token::Macaroon("stored-long-ago".to_string()));
        assert!(decoded.expires_at.is_none());
        assert!(!decoded.is_expired());
    }

    #[test]
    fn test_decodes_legacy_bare_macaroon_pair() {
        let encoded = BASE64.encode(r#"{"r": "root", "d": "discharge"}"#);
        let decoded = decode(&encoded).expect("legacy pair should decode");
        assert_eq!(
            decoded.token,
            Token::SsoMacaroon(MacaroonPair {
                root: "root".to_string(),
                discharge: "discharge".to_string(),
            })
        );
    }

    #[test]
    fn test_malformed_base64_is_not_parseable() {
        match decode("not-base64!!!") {
            Err(Error::CredentialsNotParseable(_)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_version_tag_is_not_parseable() {
        let encoded = BASE64.encode(r#"{"t": "jwt", "v": "eyJ..."}"#);
        match decode(&encoded) {
            Err(Error::CredentialsNotParseable(_)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_non_object_json_is_not_parseable() {
        let encoded = BASE64.encode("42");
        match decode(&encoded) {
            Err(Error::CredentialsNotParseable(_)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_expiry_window() {
        let mut credential =
            Credential::issue(Token::Macaroon("m".to_string()), &login_request());
        assert!(!credential.is_expired());

        credential.issued_at = Some(Utc::now() - Duration::hours(2));
        credential.expires_at = Some(Utc::now() - Duration::hours(1));
        assert!(credential.is_expired());
    }

    #[test]
    fn test_renewed_restarts_window_and_keeps_scope() {
        let mut credential =
            Credential::issue(Token::Macaroon("old".to_string()), &login_request());
        credential.issued_at = Some(Utc::now() - Duration::hours(2));
        credential.expires_at = Some(Utc::now() - Duration::hours(1));

        let renewed = credential.renewed(Token::Macaroon("new".to_string()));
        assert!(!renewed.is_expired());
        assert_eq!(renewed.permissions, credential.permissions);
        assert_eq!(renewed.packages, credential.packages);
        // The original is untouched.
        assert_eq!(credential.token, Token::Macaroon("old".to_string()));
    }
}
