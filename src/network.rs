//! Network abstraction: requests, responses and the HTTP backend.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{CACHE_CONTROL, PRAGMA};

use crate::config::SyncConfig;
use crate::error::Result;

/// An outgoing request for an application resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Absolute request URL.
    pub url: String,
    /// HTTP method.
    pub method: Method,
    /// Bypass any intermediate HTTP cache and force revalidation.
    pub reload: bool,
}

impl Request {
    /// Creates a GET request for `url`.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            reload: false,
        }
    }

    /// Creates a request with an arbitrary method.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            reload: false,
        }
    }

    /// Marks the request as a forced reload.
    #[must_use]
    pub fn with_reload(mut self) -> Self {
        self.reload = true;
        self
    }
}

/// A fully buffered response, either live from the network or from a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// URL the response was produced for.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response headers in arrival order.
    pub headers: Vec<(String, String)>,
    /// Response body. Cloning is cheap.
    pub body: Bytes,
}

impl Response {
    /// Creates a response with no headers.
    #[must_use]
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns the first header value named `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    async fn from_reqwest(response: reqwest::Response) -> Result<Self> {
        let url = response.url().to_string();
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let body = response.bytes().await?;
        Ok(Self {
            url,
            status,
            headers,
            body,
        })
    }
}

/// Abstraction over the network for testability.
///
/// Implementations return `Ok` for every response that arrived, whatever its
/// status; `Err` means the request never produced a response.
#[async_trait]
pub trait Network: Send + Sync {
    /// Performs `request` and buffers the full response.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Network backend built on a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: reqwest::Client,
}

impl HttpNetwork {
    /// Builds a client configured from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(config.prefetch_concurrency.max(1))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        if request.reload {
            builder = builder
                .header(CACHE_CONTROL, "no-cache")
                .header(PRAGMA, "no-cache");
        }
        let response = builder.send().await?;
        Response::from_reqwest(response).await
    }
}
