//! HTTP transport abstraction for the Azure Search and Tika endpoints.
//!
//! All network traffic goes through the [`Transport`] trait so the engine can
//! be exercised against a [`MockTransport`] in tests. Responses with 4xx/5xx
//! status codes are returned as normal values, never as errors, so callers
//! can branch on the status code the way the wire protocol requires.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::config::ProxyConfig;

/// Status code and body of an HTTP response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Pluggable HTTP client used by the engine.
///
/// Errors are reserved for connection-level failures (DNS, refused
/// connection); any response the server actually produced is `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<TransportResponse>;
    async fn put(&self, url: &str, body: String) -> Result<TransportResponse>;
    async fn post(&self, url: &str, body: String) -> Result<TransportResponse>;
    async fn delete(&self, url: &str) -> Result<TransportResponse>;

    /// Upload file content as a multipart form (single `upload_file` part).
    async fn post_file(
        &self,
        url: &str,
        filename: &str,
        content: Vec<u8>,
    ) -> Result<TransportResponse>;
}

// ═══════════════════════════════════════════════════════════════════════
// Live transport
// ═══════════════════════════════════════════════════════════════════════

/// Transport backed by a [`reqwest::Client`].
///
/// Sends the configured `api-key` header on every request and honors the
/// optional outbound proxy settings.
pub struct HttpTransport {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(api_key: Option<String>, proxy: Option<&ProxyConfig>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();

        if let Some(proxy) = proxy {
            builder = builder.proxy(build_proxy(proxy)?);
        }

        let client = builder.build().context("Failed to build HTTP client")?;
        Ok(Self { client, api_key })
    }

    fn apply_headers(&self, mut req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref key) = self.api_key {
            req = req.header("api-key", key);
        }
        req
    }

    async fn finish(&self, req: reqwest::RequestBuilder, url: &str) -> Result<TransportResponse> {
        let resp = self
            .apply_headers(req)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Ok(TransportResponse { status, body })
    }
}

/// Build a [`reqwest::Proxy`] from the config proxy settings, including
/// credentials and the bypass list.
fn build_proxy(config: &ProxyConfig) -> Result<reqwest::Proxy> {
    let server = match config.port {
        Some(port) => format!("{}:{}", config.host, port),
        None => config.host.clone(),
    };

    let mut proxy =
        reqwest::Proxy::all(&server).with_context(|| format!("Invalid proxy: {}", server))?;

    if let (Some(user), Some(pass)) = (&config.username, &config.password) {
        proxy = proxy.basic_auth(user, pass);
    }
    if let Some(ref bypass) = config.bypass {
        let nospace: String = bypass.chars().filter(|c| !c.is_whitespace()).collect();
        proxy = proxy.no_proxy(reqwest::NoProxy::from_string(&nospace));
    }

    Ok(proxy)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse> {
        self.finish(self.client.get(url), url).await
    }

    async fn put(&self, url: &str, body: String) -> Result<TransportResponse> {
        let req = self
            .client
            .put(url)
            .header("content-type", "application/json")
            .body(body);
        self.finish(req, url).await
    }

    async fn post(&self, url: &str, body: String) -> Result<TransportResponse> {
        let req = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .body(body);
        self.finish(req, url).await
    }

    async fn delete(&self, url: &str) -> Result<TransportResponse> {
        self.finish(self.client.delete(url), url).await
    }

    async fn post_file(
        &self,
        url: &str,
        filename: &str,
        content: Vec<u8>,
    ) -> Result<TransportResponse> {
        let part = reqwest::multipart::Part::bytes(content).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("upload_file", part);
        self.finish(self.client.post(url).multipart(form), url).await
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Mock transport
// ═══════════════════════════════════════════════════════════════════════

/// One request captured by [`MockTransport`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub body: String,
}

/// Transport that replays canned responses and records every request.
///
/// Responses are consumed in FIFO order; once the queue is empty every
/// request receives the default response (`200`, empty body).
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<TransportResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a canned response for the next unanswered request.
    pub fn push_response(&self, status: u16, body: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(TransportResponse::new(status, body));
    }

    /// All requests seen so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests issued with the given HTTP method.
    pub fn requests_with_method(&self, method: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method)
            .collect()
    }

    fn record(&self, method: &str, url: &str, body: &str) -> TransportResponse {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: method.to_string(),
            url: url.to_string(),
            body: body.to_string(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| TransportResponse::new(200, ""))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse> {
        Ok(self.record("GET", url, ""))
    }

    async fn put(&self, url: &str, body: String) -> Result<TransportResponse> {
        Ok(self.record("PUT", url, &body))
    }

    async fn post(&self, url: &str, body: String) -> Result<TransportResponse> {
        Ok(self.record("POST", url, &body))
    }

    async fn delete(&self, url: &str) -> Result<TransportResponse> {
        Ok(self.record("DELETE", url, ""))
    }

    async fn post_file(
        &self,
        url: &str,
        filename: &str,
        _content: Vec<u8>,
    ) -> Result<TransportResponse> {
        Ok(self.record("POSTFILE", url, filename))
    }
}
