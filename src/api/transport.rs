//! HTTP transport capability.
//!
//! Everything the core sends goes through the `HttpTransport` trait so tests
//! can script exchanges without a network. The production implementation
//! wraps a shared `reqwest::Client`.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::{Error, Result};

/// HTTP request timeout in seconds.
/// 30s allows for slow store responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Request method subset used by the store APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

/// Body payload of an outbound request.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(Value),
    /// Multipart upload: one part named `binary` streaming the file.
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Body,
}

impl TransportRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(url)
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, value: Value) -> Self {
        self.body = Body::Json(value);
        self
    }

    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.body = Body::File(path.into());
        self
    }

    /// Value of a header, if present.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A completed HTTP round trip; status classification is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| Error::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send one request. Transport failures (DNS, connection, timeout) are
    /// `Error::Network`; any HTTP status is a completed round trip.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// reqwest-backed transport shared by every call of a client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    user_agent: String,
}

impl ReqwestTransport {
    pub fn new(user_agent: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(Self {
            client,
            user_agent: user_agent.into(),
        })
    }
}

/// Header values that must never reach the logs in the clear.
fn redacted(name: &str, value: &str) -> String {
    if name.eq_ignore_ascii_case("authorization") || name.eq_ignore_ascii_case("macaroons") {
        "<macaroon>".to_string()
    } else {
        value.to_string()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let debug_headers: Vec<String> = request
            .headers
            .iter()
            .map(|(n, v)| format!("{}: {}", n, redacted(n, v)))
            .collect();
        debug!(
            method = request.method.as_str(),
            url = %request.url,
            headers = ?debug_headers,
            "sending store request"
        );

        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Put => self.client.put(&request.url),
        };
        builder = builder.header(reqwest::header::USER_AGENT, &self.user_agent);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        match request.body {
            Body::Empty => {}
            Body::Json(value) => {
                builder = builder.json(&value);
            }
            Body::File(path) => {
                let file = tokio::fs::File::open(&path).await?;
                let length = file.metadata().await?.len();
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "upload".to_string());
                let part = reqwest::multipart::Part::stream_with_length(
                    reqwest::Body::wrap_stream(ReaderStream::new(file)),
                    length,
                )
                .file_name(file_name)
                .mime_str("application/octet-stream")
                .map_err(|e| Error::InvalidRequest(e.to_string()))?;
                builder = builder.multipart(reqwest::multipart::Form::new().part("binary", part));
            }
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    /// Scripted transport: each send pops the next canned reply and records
    /// the request. An exhausted script answers 200 with an empty object.
    pub(crate) struct FakeTransport {
        replies: Mutex<VecDeque<Result<TransportResponse>>>,
        requests: Mutex<Vec<TransportRequest>>,
        delay: Mutex<Option<Duration>>,
    }

    impl FakeTransport {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
                delay: Mutex::new(None),
            })
        }

        pub(crate) fn reply(&self, status: u16, body: impl Into<String>) {
            self.replies.lock().push_back(Ok(TransportResponse {
                status,
                body: body.into(),
            }));
        }

        pub(crate) fn reply_err(&self, err: Error) {
            self.replies.lock().push_back(Err(err));
        }

        /// Sleep this long inside each send, to widen race windows.
        pub(crate) fn set_delay(&self, delay: Duration) {
            *self.delay.lock() = Some(delay);
        }

        pub(crate) fn sent(&self) -> usize {
            self.requests.lock().len()
        }

        pub(crate) fn request(&self, index: usize) -> TransportRequest {
            self.requests.lock()[index].clone()
        }
    }

    #[async_trait]
    impl HttpTransport for FakeTransport {
        async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.requests.lock().push(request);
            self.replies.lock().pop_front().unwrap_or(Ok(TransportResponse {
                status: 200,
                body: "{}".to_string(),
            }))
        }
    }
}
