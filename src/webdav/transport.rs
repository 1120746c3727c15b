//! HTTP transport
//!
//! The cache core only needs "send this request, give me body + status + error".
//! [`ReqwestTransport`] is the production implementation; tests swap in their own.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use reqwest::{Client, Method};
use tracing::{debug, warn};

/// HTTP methods used against WebDAV and OCS endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Put,
    Delete,
    Propfind,
    Mkcol,
    Move,
    Copy,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Propfind => "PROPFIND",
            HttpMethod::Mkcol => "MKCOL",
            HttpMethod::Move => "MOVE",
            HttpMethod::Copy => "COPY",
        }
    }
}

/// A fully built, authorized request
#[derive(Debug, Clone)]
pub struct DavRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl DavRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>, auth_header: String) -> Self {
        Self {
            method,
            url: url.into(),
            headers: vec![("Authorization".to_string(), auth_header)],
            body: None,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Value of the first header with this name (case-insensitive)
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// What came back: any of the three parts may be missing
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub body: Option<Bytes>,
    pub status: Option<u16>,
    pub error: Option<String>,
}

impl TransportResponse {
    pub fn ok(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            body: Some(body.into()),
            status: Some(status),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            body: None,
            status: None,
            error: Some(error.into()),
        }
    }
}

/// Performs one request; called once per network operation
#[async_trait]
pub trait Transport: Send + Sync {
    async fn perform(&self, request: DavRequest) -> TransportResponse;
}

/// Transport backed by a shared `reqwest::Client`
#[derive(Clone)]
pub struct ReqwestTransport {
    http_client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn perform(&self, request: DavRequest) -> TransportResponse {
        let method = match Method::from_bytes(request.method.as_str().as_bytes()) {
            Ok(method) => method,
            Err(e) => return TransportResponse::failed(e.to_string()),
        };

        debug!(method = request.method.as_str(), url = %request.url, "Sending WebDAV request");

        let mut builder = self.http_client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %request.url, error = %e, "WebDAV request failed");
                return TransportResponse::failed(e.to_string());
            }
        };

        let status = response.status().as_u16();
        match response.bytes().await {
            Ok(body) => TransportResponse {
                body: Some(body),
                status: Some(status),
                error: None,
            },
            Err(e) => TransportResponse {
                body: None,
                status: Some(status),
                error: Some(format!("Failed to read response body: {}", e)),
            },
        }
    }
}

/// Basic authentication header value.
///
/// `None` when the username cannot be carried by Basic credentials.
pub fn basic_auth_header(username: &str, password: &str) -> Option<String> {
    if username.contains(':') {
        return None;
    }
    let credentials = format!("{}:{}", username, password);
    let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
    Some(format!("Basic {}", encoded))
}
