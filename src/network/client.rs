//! HTTP client used both for the proxy control calls and for wrapped service calls

use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::Request;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rustls::ClientConfig;
use tracing::{debug, warn};

use super::tls;
use super::{ForwardedResponse, Transport};
use crate::{Result, ShimError};

/// HTTP(S) client that buffers response bodies
#[derive(Clone)]
pub struct HttpClient {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    timeout: Option<Duration>,
    verifies_certificates: bool,
}

impl HttpClient {
    /// Create a client that verifies server certificates
    ///
    /// # Errors
    ///
    /// Returns error if TLS cannot be configured
    pub fn new() -> Result<Self> {
        Ok(Self::with_tls(tls::verified_config()?, true))
    }

    /// Create a client for the local test proxy
    ///
    /// Certificate chains are not verified: the proxy serves a self-signed
    /// development certificate. Do not use this client for anything else.
    ///
    /// # Errors
    ///
    /// Returns error if TLS cannot be configured
    pub fn for_test_proxy() -> Result<Self> {
        Ok(Self::with_tls(tls::test_proxy_config()?, false))
    }

    fn with_tls(tls: ClientConfig, verifies_certificates: bool) -> Self {
        let connector = HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build(connector);

        Self {
            client,
            timeout: None,
            verifies_certificates,
        }
    }

    /// Bound every request, body included, by `timeout`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Configured per-request timeout
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether server certificate chains are checked against the webpki roots
    #[must_use]
    pub fn verifies_certificates(&self) -> bool {
        self.verifies_certificates
    }

    async fn dispatch(&self, request: Request<Full<Bytes>>) -> Result<ForwardedResponse> {
        let url = request.uri().clone();

        debug!("Sending {} {}", request.method(), url);

        let response = self.client.request(request).await.map_err(|e| {
            warn!("Request to {url} failed: {e}");
            ShimError::Transport(format!("Request to {url} failed: {e}"))
        })?;

        let (parts, body) = response.into_parts();

        let body = body
            .collect()
            .await
            .map_err(|e| ShimError::Transport(format!("Failed to read response body: {e}")))?
            .to_bytes();

        Ok(ForwardedResponse {
            url,
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

impl Transport for HttpClient {
    async fn send(&self, request: Request<Full<Bytes>>) -> Result<ForwardedResponse> {
        match self.timeout {
            Some(timeout) => {
                let url = request.uri().clone();
                tokio::time::timeout(timeout, self.dispatch(request))
                    .await
                    .map_err(|_| {
                        ShimError::Transport(format!(
                            "Request to {url} timed out after {}ms",
                            timeout.as_millis()
                        ))
                    })?
            }
            None => self.dispatch(request).await,
        }
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("timeout", &self.timeout)
            .field("verifies_certificates", &self.verifies_certificates)
            .finish_non_exhaustive()
    }
}
