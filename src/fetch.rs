//! Backend fetch capabilities: the pooled HTTP client, the key-value
//! backend trait, and the per-page request context

use crate::error::{EsiError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The request a page is being rendered for. Carries the data templates and
/// header forwarding read from, plus the cancellation scope every backend
/// fetch is bound to.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub cancel: CancellationToken,
}

impl PageRequest {
    /// Create a request context with a fresh cancellation scope.
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        PageRequest {
            method,
            uri,
            headers,
            cancel: CancellationToken::new(),
        }
    }

    /// Create a GET request context for the given URI.
    pub fn get(uri: &str) -> Result<Self> {
        let uri: Uri = uri
            .parse()
            .map_err(|e| EsiError::Config(format!("invalid request uri: {}", e)))?;
        Ok(PageRequest::new(Method::GET, uri, HeaderMap::new()))
    }

    /// Attach an existing cancellation scope, e.g. the one owned by the
    /// host's request handler.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Pooled HTTP client for backend GETs.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .http2_adaptive_window(true)
            .build()
            .expect("Failed to create HTTP client");

        HttpFetcher { client }
    }

    /// Issue one GET against a backend.
    ///
    /// The deadline is whichever fires first: `timeout` or the request
    /// scope's cancellation. Non-2xx responses are failures. The body is
    /// read fully into memory.
    pub async fn fetch(
        &self,
        url: &str,
        headers: HeaderMap,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        let request = self
            .client
            .get(url)
            .headers(headers)
            .timeout(timeout);

        let fetch = async {
            let response = request.send().await.map_err(|e| fetch_error(url, e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(EsiError::from_http_status(url, status.as_u16()));
            }

            response.bytes().await.map_err(|e| fetch_error(url, e))
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(EsiError::Canceled),
            result = fetch => result,
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        HttpFetcher::new()
    }
}

fn fetch_error(url: &str, e: reqwest::Error) -> EsiError {
    let reason = if e.is_timeout() {
        "timed out".to_string()
    } else {
        e.to_string()
    };
    EsiError::ResourceFetch {
        url: url.to_string(),
        reason,
    }
}

/// Capability exposed by a key-value backend driver. A non-URL `src` or a
/// `key` attribute resolves through this.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Look up one key and return its value bytes.
    async fn get(&self, key: &str) -> Result<Bytes>;
}
