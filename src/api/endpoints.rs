//! Endpoint descriptors for the supported store families.
//!
//! The session and gateway treat these purely as lookup tables; per-family
//! differences in paths and token-request shape live here.

use serde_json::{json, Value};

use crate::auth::Permission;
use crate::error::{Error, Result};

/// A package name plus its type, for scoping a token request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub package_type: String,
}

impl Package {
    pub fn new(name: impl Into<String>, package_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package_type: package_type.into(),
        }
    }
}

/// Attenuations requested at login.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub permissions: Vec<Permission>,
    /// Client description the store shows next to the issued token.
    pub description: String,
    /// Validity of the requested credential, in seconds.
    pub ttl: u64,
    pub packages: Option<Vec<Package>>,
    pub channels: Option<Vec<String>>,
}

impl LoginRequest {
    pub fn new(permissions: Vec<Permission>, description: impl Into<String>, ttl: u64) -> Self {
        Self {
            permissions,
            description: description.into(),
            ttl,
            packages: None,
            channels: None,
        }
    }
}

/// Paths a store family exposes for the operations the core drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub namespace: &'static str,
    pub whoami: &'static str,
    pub tokens: &'static str,
    pub tokens_exchange: &'static str,
    pub tokens_refresh: Option<&'static str>,
    pub tokens_revoke: Option<&'static str>,
    pub upload: &'static str,
    pub valid_package_types: &'static [&'static str],
}

/// Endpoints for the package store.
pub const PACKAGE_STORE: Endpoints = Endpoints {
    namespace: "package",
    whoami: "/v1/tokens/whoami",
    tokens: "/v1/tokens",
    tokens_exchange: "/v1/tokens/exchange",
    tokens_refresh: None,
    tokens_revoke: Some("/v1/tokens/revoke"),
    upload: "/unscanned-upload/",
    valid_package_types: &["package", "bundle"],
};

/// Endpoints for stores fronted by the federated SSO service.
pub const SSO_STORE: Endpoints = Endpoints {
    namespace: "package",
    whoami: "/api/v2/tokens/whoami",
    tokens: "/api/v2/tokens",
    tokens_exchange: "/api/v2/tokens/discharge",
    tokens_refresh: Some("/api/v2/tokens/refresh"),
    tokens_revoke: None,
    upload: "/unscanned-upload/",
    valid_package_types: &["package"],
};

impl Endpoints {
    fn validate_packages(&self, packages: &[Package]) -> Result<()> {
        let unknown: Vec<&str> = packages
            .iter()
            .map(|p| p.package_type.as_str())
            .filter(|t| !self.valid_package_types.contains(t))
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidRequest(format!(
                "package types {:?} not in {:?}",
                unknown, self.valid_package_types
            )))
        }
    }

    /// Build the token-request body for this family.
    pub fn token_request(&self, login: &LoginRequest) -> Result<Value> {
        let mut request = json!({
            "permissions": login.permissions,
            "description": login.description,
            "ttl": login.ttl,
        });

        if let Some(packages) = &login.packages {
            self.validate_packages(packages)?;
            request["packages"] = packages
                .iter()
                .map(|p| json!({"type": p.package_type, "name": p.name}))
                .collect();
        }
        if let Some(channels) = &login.channels {
            request["channels"] = json!(channels);
        }

        Ok(request)
    }

    pub fn releases_path(&self, name: &str) -> String {
        format!("/v1/{}/{}/releases", self.namespace, name)
    }

    pub fn revisions_path(&self, name: &str) -> String {
        format!("/v1/{}/{}/revisions", self.namespace, name)
    }

    pub fn resource_revisions_path(&self, name: &str, resource: &str) -> String {
        format!(
            "/v1/{}/{}/resources/{}/revisions",
            self.namespace, name, resource
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_request_shape() {
        let mut login = LoginRequest::new(
            vec![Permission::PackageAccess, Permission::PackagePush],
            "ci token",
            86400,
        );
        login.packages = Some(vec![Package::new("hello-world", "package")]);
        login.channels = Some(vec!["edge".to_string()]);

        let request = PACKAGE_STORE
            .token_request(&login)
            .expect("request should build");
        assert_eq!(
            request["permissions"],
            json!(["package-access", "package-push"])
        );
        assert_eq!(request["description"], "ci token");
        assert_eq!(request["ttl"], 86400);
        assert_eq!(
            request["packages"],
            json!([{"type": "package", "name": "hello-world"}])
        );
        assert_eq!(request["channels"], json!(["edge"]));
    }

    #[test]
    fn test_token_request_omits_absent_scope() {
        let login = LoginRequest::new(vec![Permission::PackageView], "read only", 3600);
        let request = PACKAGE_STORE
            .token_request(&login)
            .expect("request should build");
        assert!(request.get("packages").is_none());
        assert!(request.get("channels").is_none());
    }

    #[test]
    fn test_unknown_package_type_is_rejected() {
        let mut login = LoginRequest::new(vec![Permission::PackagePush], "push", 3600);
        login.packages = Some(vec![Package::new("hello-world", "plugin")]);
        match SSO_STORE.token_request(&login) {
            Err(Error::InvalidRequest(message)) => assert!(message.contains("plugin")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_namespaced_paths() {
        assert_eq!(
            PACKAGE_STORE.releases_path("hello-world"),
            "/v1/package/hello-world/releases"
        );
        assert_eq!(
            PACKAGE_STORE.revisions_path("hello-world"),
            "/v1/package/hello-world/revisions"
        );
        assert_eq!(
            PACKAGE_STORE.resource_revisions_path("hello-world", "db-image"),
            "/v1/package/hello-world/resources/db-image/revisions"
        );
    }
}
