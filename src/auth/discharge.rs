//! Third-party caveat discharge against the SSO service.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::api::transport::{HttpTransport, TransportRequest};
use crate::auth::session::Discharger;
use crate::error::{Error, Result};

#[derive(Deserialize)]
struct DischargeResponse {
    discharge_macaroon: String,
}

/// Discharger for SSO-fronted stores: exchanges account credentials (and an
/// optional second factor) for a discharge macaroon bound to the root.
///
/// A store demanding a second factor answers with a `twofactor-required`
/// error code in the `StoreServer` error list; callers re-prompt and retry
/// with `otp` set.
pub struct SsoDischarger {
    transport: Arc<dyn HttpTransport>,
    /// Full URL of the discharge endpoint on the SSO service.
    url: String,
    email: String,
    password: String,
    otp: Option<String>,
}

impl SsoDischarger {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        url: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        otp: Option<String>,
    ) -> Self {
        Self {
            transport,
            url: url.into(),
            email: email.into(),
            password: password.into(),
            otp,
        }
    }
}

#[async_trait]
impl Discharger for SsoDischarger {
    async fn discharge(&self, root_macaroon: &str) -> Result<String> {
        let mut body = serde_json::json!({
            "email": self.email,
            "password": self.password,
            "macaroon": root_macaroon,
        });
        if let Some(otp) = &self.otp {
            body["otp"] = serde_json::json!(otp);
        }

        debug!(url = %self.url, "requesting discharge macaroon");
        let request = TransportRequest::post(self.url.clone())
            .header("Accept", "application/json")
            .json(body);
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(Error::from_store_response(response.status, &response.body));
        }
        Ok(response.json::<DischargeResponse>()?.discharge_macaroon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::fake::FakeTransport;
    use crate::api::transport::Body;

    #[tokio::test]
    async fn test_discharge_exchanges_account_credentials() {
        let transport = FakeTransport::new();
        transport.reply(200, r#"{"discharge_macaroon": "discharged"}"#);
        let discharger = SsoDischarger::new(
            transport.clone(),
            "https://login.example.com/api/v2/tokens/discharge",
            "dev@example.com",
            "hunter2",
            None,
        );

        let discharge = discharger
            .discharge("root-macaroon")
            .await
            .expect("discharge should succeed");
        assert_eq!(discharge, "discharged");

        let request = transport.request(0);
        match &request.body {
            Body::Json(body) => {
                assert_eq!(body["email"], "dev@example.com");
                assert_eq!(body["macaroon"], "root-macaroon");
                assert!(body.get("otp").is_none());
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_second_factor_challenge_is_inspectable() {
        let transport = FakeTransport::new();
        transport.reply(
            401,
            r#"{"error_list": [{"code": "twofactor-required", "message": "2FA required"}]}"#,
        );
        let discharger = SsoDischarger::new(
            transport.clone(),
            "https://login.example.com/api/v2/tokens/discharge",
            "dev@example.com",
            "hunter2",
            None,
        );

        match discharger.discharge("root-macaroon").await {
            Err(Error::StoreServer { error_list, .. }) => {
                assert!(error_list.contains("twofactor-required"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_otp_is_forwarded_when_present() {
        let transport = FakeTransport::new();
        transport.reply(200, r#"{"discharge_macaroon": "discharged"}"#);
        let discharger = SsoDischarger::new(
            transport.clone(),
            "https://login.example.com/api/v2/tokens/discharge",
            "dev@example.com",
            "hunter2",
            Some("123456".to_string()),
        );

        discharger
            .discharge("root-macaroon")
            .await
            .expect("discharge should succeed");
        match &transport.request(0).body {
            Body::Json(body) => assert_eq!(body["otp"], "123456"),
            other => panic!("unexpected body: {other:?}"),
        }
    }
}
