//! Account identity models.

use serde::{Deserialize, Serialize};

/// Account behind the current credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(rename = "display-name", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Payload of the whoami endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoamiResponse {
    pub account: Account,
    /// Permissions attenuating the presented credential.
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub channels: Option<Vec<String>>,
    #[serde(default)]
    pub packages: Option<Vec<String>>,
}
