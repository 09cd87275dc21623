//! Single-attempt HTTP exchange with the backend.

use super::classify::TransportFailure;
use crate::config::Config;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER};
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Bearer token for the backend session. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BearerToken").field(&"[REDACTED]").finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Delete => Self::DELETE,
        }
    }
}

/// One request, relative to the backend base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub bearer: Option<BearerToken>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            bearer: None,
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_bearer(mut self, bearer: Option<BearerToken>) -> Self {
        self.bearer = bearer;
        self
    }
}

/// A 2xx response, body not yet decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

/// Performs exactly one attempt. Retrying is the caller's business.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportFailure>;
}

/// `reqwest`-backed transport with a per-attempt deadline.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration, connect_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.api_base_url.clone(),
            config.request_timeout(),
            config.connect_timeout(),
        )
    }

    fn build_headers(bearer: Option<&BearerToken>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(token) = bearer {
            match HeaderValue::from_str(&format!("Bearer {}", token.expose())) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!("Stored token contains invalid header characters, sending without it"),
            }
        }

        headers
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportFailure> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self
            .client
            .request(request.method.into(), &url)
            .headers(Self::build_headers(request.bearer.as_ref()));
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(failure_from_reqwest)?;
        let status = response.status();

        if status.is_success() {
            let body = response.text().await.map_err(failure_from_reqwest)?;
            return Ok(ApiResponse {
                status: status.as_u16(),
                body,
            });
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.ok().filter(|b| !b.is_empty());

        Err(TransportFailure::Status {
            status: status.as_u16(),
            retry_after,
            body,
        })
    }
}

/// Deadline errors become timeouts; everything else is a connectivity failure.
fn failure_from_reqwest(err: reqwest::Error) -> TransportFailure {
    if err.is_timeout() {
        TransportFailure::TimedOut {
            detail: err.to_string(),
        }
    } else {
        TransportFailure::Connect {
            detail: err.to_string(),
        }
    }
}
