//! Recording session management

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use http::header::CONTENT_TYPE;
use http::{Request, StatusCode};
use http_body_util::Full;
use hyper::body::Bytes;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::{Mode, ProxyConfig};
use crate::network::{HttpClient, OutgoingRequest, Transport};
use crate::proxy::{Redirect, RECORDING_FILE_KEY, RECORDING_ID_HEADER};
use crate::{Result, ShimError};

use super::recording_file_path;

/// Session variables issued by the proxy on start
pub type Variables = HashMap<String, Value>;

/// Lifecycle state of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Not started yet
    Uninitialized,
    /// Started; the proxy issued this recording id
    Started {
        /// Recording id issued by the proxy
        recording_id: String,
    },
    /// Stopped; the recording id is no longer valid
    Stopped,
}

/// One recording or playback session with the test proxy
#[derive(Debug)]
pub struct Session<T = HttpClient> {
    config: ProxyConfig,
    client: T,
    state: SessionState,
    variables: Variables,
}

impl Session<HttpClient> {
    /// Create a session with a client suited to its mode
    ///
    /// Record and playback traffic only ever reaches the local test proxy,
    /// so those sessions skip certificate verification. A live session talks
    /// to the real service and always verifies.
    ///
    /// # Errors
    ///
    /// Returns error if the client cannot be built
    pub fn for_config(config: ProxyConfig) -> Result<Self> {
        let mut client = if config.mode.is_live() {
            HttpClient::new()?
        } else {
            HttpClient::for_test_proxy()?
        };
        if let Some(ms) = config.timeout_ms {
            client = client.with_timeout(Duration::from_millis(ms));
        }
        Ok(Self::new(config, client))
    }
}

impl<T: Transport> Session<T> {
    /// Create an unstarted session
    pub fn new(config: ProxyConfig, client: T) -> Self {
        Self {
            config,
            client,
            state: SessionState::Uninitialized,
            variables: Variables::new(),
        }
    }

    /// Rebuild a started session from a recording id obtained elsewhere
    ///
    /// # Errors
    ///
    /// Returns error if the mode is live or the recording id is empty
    pub fn resume(config: ProxyConfig, client: T, recording_id: impl Into<String>) -> Result<Self> {
        let recording_id = recording_id.into();
        if recording_id.is_empty() {
            return Err(ShimError::Configuration(
                "Recording id cannot be empty".to_string(),
            ));
        }

        let mut session = Self::new(config, client);
        session.ensure_proxied("resume")?;
        session.state = SessionState::Started { recording_id };
        Ok(session)
    }

    /// Session configuration
    #[must_use]
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Session mode
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Whether the proxy has issued a recording id that is still valid
    #[must_use]
    pub fn is_started(&self) -> bool {
        matches!(self.state, SessionState::Started { .. })
    }

    /// Recording id, while the session is started
    #[must_use]
    pub fn recording_id(&self) -> Option<&str> {
        match &self.state {
            SessionState::Started { recording_id } => Some(recording_id),
            _ => None,
        }
    }

    /// Variables the proxy returned on start
    #[must_use]
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// Client used for control calls
    pub fn client(&self) -> &T {
        &self.client
    }

    fn ensure_proxied(&self, action: &str) -> Result<()> {
        if self.config.mode.is_live() {
            return Err(ShimError::Configuration(format!(
                "Cannot {action} a live session: live mode never talks to the proxy"
            )));
        }
        Ok(())
    }

    fn control_url(&self, action: &str) -> String {
        format!("{}/{}/{action}", self.config.base_url(), self.config.mode)
    }

    /// Tell the proxy to begin a session for `test_name`
    ///
    /// The recording id is stored as soon as the proxy issues it, so a
    /// session whose variables fail to decode is still started and must be
    /// stopped.
    ///
    /// # Errors
    ///
    /// Returns error if the session is live or already started, the request
    /// fails, the proxy issues no recording id, or the response body is not
    /// a JSON object
    pub async fn start(&mut self, test_name: &str) -> Result<()> {
        self.ensure_proxied("start")?;
        match self.state {
            SessionState::Uninitialized => {}
            SessionState::Started { .. } => {
                return Err(ShimError::Configuration(
                    "Session is already started".to_string(),
                ))
            }
            SessionState::Stopped => {
                return Err(ShimError::Configuration(
                    "Session was stopped and cannot be restarted".to_string(),
                ))
            }
        }
        self.config.validate()?;

        let recording_file = recording_file_path(&self.config.recording_path, test_name)?;
        let payload = serde_json::to_vec(&HashMap::from([(RECORDING_FILE_KEY, &recording_file)]))?;

        let request = build_request(
            Request::post(self.control_url("start")).header(CONTENT_TYPE, "application/json"),
            Bytes::from(payload),
        )?;

        let response = self.client.send(request).await?;

        let recording_id = match response.header(RECORDING_ID_HEADER) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                warn!("Proxy returned no recording id for {recording_file}");
                return Err(ShimError::protocol(
                    "recording id was not returned by the response",
                    &response.body,
                ));
            }
        };

        info!(
            "Started {} session {} for {}",
            self.config.mode, recording_id, recording_file
        );
        self.state = SessionState::Started { recording_id };

        if !response.body.is_empty() {
            let variables: Option<Variables> = serde_json::from_slice(&response.body)?;
            self.variables = variables.unwrap_or_default();
        }

        Ok(())
    }

    /// Tell the proxy to finalize the session
    ///
    /// Once the request has been attempted the session is stopped, whatever
    /// the outcome.
    ///
    /// # Errors
    ///
    /// Returns error if the session is not started, the request fails, or
    /// the proxy answers with anything but 200
    pub async fn stop(&mut self) -> Result<()> {
        let recording_id = match &self.state {
            SessionState::Started { recording_id } => recording_id.clone(),
            SessionState::Uninitialized => {
                return Err(ShimError::Configuration(
                    "Session was never started".to_string(),
                ))
            }
            SessionState::Stopped => {
                return Err(ShimError::Configuration(
                    "Session is already stopped".to_string(),
                ))
            }
        };

        let request = build_request(
            Request::post(self.control_url("stop")).header(RECORDING_ID_HEADER, recording_id.as_str()),
            Bytes::new(),
        )?;

        let outcome = self.client.send(request).await;
        self.state = SessionState::Stopped;
        let response = outcome?;

        if response.status != StatusCode::OK {
            warn!(
                "Proxy answered {} when stopping session {}",
                response.status, recording_id
            );
            return Err(ShimError::protocol(
                format!(
                    "proxy did not stop the recording properly (status {})",
                    response.status
                ),
                &response.body,
            ));
        }

        info!("Stopped {} session {}", self.config.mode, recording_id);
        Ok(())
    }

    /// Interceptor over `inner` bound to this session
    ///
    /// # Errors
    ///
    /// Returns error if the mode is record or playback and the session is
    /// not started
    pub fn transport<U>(&self, inner: U) -> Result<Redirect<U>> {
        Redirect::new(inner, &self.config, self.recording_id())
    }
}

impl<T: Transport + Clone> Session<T> {
    /// Interceptor over this session's own client
    ///
    /// # Errors
    ///
    /// Returns error if the mode is record or playback and the session is
    /// not started
    pub fn redirect(&self) -> Result<Redirect<T>> {
        self.transport(self.client.clone())
    }

    /// Run `body` inside a started session and stop it on every exit path
    ///
    /// In live mode `body` runs against a passthrough and the proxy is never
    /// contacted. The body's error wins over a stop error.
    ///
    /// # Errors
    ///
    /// Returns the first of: start failure, body failure, stop failure
    pub async fn scoped<F, Fut, R>(&mut self, test_name: &str, body: F) -> Result<R>
    where
        F: FnOnce(Redirect<T>) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        if self.config.mode.is_live() {
            return body(Redirect::passthrough(self.client.clone())).await;
        }

        if let Err(e) = self.start(test_name).await {
            if self.is_started() {
                if let Err(stop_error) = self.stop().await {
                    warn!("Stopping session after failed start also failed: {stop_error}");
                }
            }
            return Err(e);
        }

        let outcome = match self.redirect() {
            Ok(redirect) => body(redirect).await,
            Err(e) => Err(e),
        };
        let stopped = self.stop().await;

        match (outcome, stopped) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) | (Err(e), Ok(())) => Err(e),
            (Err(e), Err(stop_error)) => {
                warn!("Stopping session after failure also failed: {stop_error}");
                Err(e)
            }
        }
    }
}

fn build_request(builder: http::request::Builder, body: Bytes) -> Result<OutgoingRequest> {
    builder
        .body(Full::new(body))
        .map_err(|e| ShimError::InvalidRequest(format!("Failed to build request: {e}")))
}
