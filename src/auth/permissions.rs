//! Capability tags a credential can be attenuated to at issuance time.

use serde::{Deserialize, Serialize};

/// Permissions grantable to a store credential.
///
/// Serialized kebab-case on the wire and in stored credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    /// Register or request a new package name under the account.
    AccountRegisterPackage,
    /// List packages owned by the account or shared with it.
    AccountViewPackages,
    /// Read access to a package and its published artifacts.
    PackageAccess,
    /// Meta permission granting all package-manage-* permissions.
    PackageManage,
    /// Release revisions, close channels.
    PackageManageReleases,
    /// Upload new blobs, check upload status, request manual review.
    PackageManageRevisions,
    /// Upload and register new revisions of a package.
    PackagePush,
    /// Meta permission granting all package-view-* permissions.
    PackageView,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::AccountRegisterPackage => "account-register-package",
            Permission::AccountViewPackages => "account-view-packages",
            Permission::PackageAccess => "package-access",
            Permission::PackageManage => "package-manage",
            Permission::PackageManageReleases => "package-manage-releases",
            Permission::PackageManageRevisions => "package-manage-revisions",
            Permission::PackagePush => "package-push",
            Permission::PackageView => "package-view",
        }
    }
}
