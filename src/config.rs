//! Configuration types for proxyshim

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::{Result, ShimError};

/// Port on which the test proxy serves TLS
pub const SECURE_PROXY_PORT: u16 = 5001;

/// Port on which the test proxy serves plain HTTP
pub const INSECURE_PROXY_PORT: u16 = 5000;

/// Default test proxy host
pub const DEFAULT_PROXY_HOST: &str = "localhost";

/// Operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Record mode: the proxy forwards traffic upstream and stores it
    Record,
    /// Playback mode: the proxy serves stored traffic
    Playback,
    /// Live mode: no proxy in the loop
    Live,
}

impl Mode {
    /// Wire name of the mode, as used in proxy paths and headers
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Record => "record",
            Mode::Playback => "playback",
            Mode::Live => "live",
        }
    }

    /// Check if mode is Live
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Mode::Live)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ShimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "record" => Ok(Mode::Record),
            "playback" => Ok(Mode::Playback),
            "live" => Ok(Mode::Live),
            other => Err(ShimError::Configuration(format!(
                "Unknown proxy mode '{other}', expected record, playback or live"
            ))),
        }
    }
}

/// Where the test proxy lives and how to talk to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Test proxy host
    #[serde(default = "default_host")]
    pub host: String,
    /// Test proxy port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Operating mode
    pub mode: Mode,
    /// Root directory under which recordings are addressed
    #[serde(default = "default_recording_path")]
    pub recording_path: PathBuf,
    /// Per-request timeout in milliseconds, none if absent
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_host() -> String {
    DEFAULT_PROXY_HOST.to_string()
}

fn default_port() -> u16 {
    SECURE_PROXY_PORT
}

fn default_recording_path() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

impl ProxyConfig {
    /// Create a configuration with default host, port and recording path
    #[must_use]
    pub fn new(mode: Mode) -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            mode,
            recording_path: default_recording_path(),
            timeout_ms: None,
        }
    }

    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ShimError::Configuration(format!("Failed to read config file: {e}"))
        })?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ShimError::Configuration(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the process environment
    ///
    /// Reads `USE_PROXY`, `PROXY_HOST`, `PROXY_PORT`, `PROXY_MODE` and
    /// `RECORDING_PATH`. When `USE_PROXY` is unset or false the mode is live.
    ///
    /// # Errors
    ///
    /// Returns error if a variable is present but malformed
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but malformed
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let use_proxy = match lookup("USE_PROXY") {
            Some(value) => parse_bool(&value)?,
            None => false,
        };

        if !use_proxy {
            return Ok(Self::new(Mode::Live));
        }

        let mode = lookup("PROXY_MODE")
            .ok_or_else(|| {
                ShimError::Configuration("PROXY_MODE must be set when USE_PROXY is true".into())
            })?
            .parse::<Mode>()?;

        let mut config = Self::new(mode);

        if let Some(host) = lookup("PROXY_HOST") {
            config.host = host;
        }

        if let Some(port) = lookup("PROXY_PORT") {
            config.port = port.trim().parse::<u16>().map_err(|e| {
                ShimError::Configuration(format!("Invalid PROXY_PORT '{port}': {e}"))
            })?;
        }

        if let Some(path) = lookup("RECORDING_PATH") {
            config.recording_path = PathBuf::from(path);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.mode.is_live() {
            return Ok(());
        }

        if self.host.trim().is_empty() {
            return Err(ShimError::Configuration(
                "Proxy host cannot be empty".to_string(),
            ));
        }

        if self.port == 0 {
            return Err(ShimError::Configuration(
                "Proxy port cannot be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Scheme used to reach the proxy
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        if self.port == SECURE_PROXY_PORT {
            "https"
        } else {
            "http"
        }
    }

    /// `host:port` of the proxy
    #[must_use]
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL of the proxy, e.g. `https://localhost:5001`
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme(), self.authority())
    }
}

/// Parse a boolean the way test harness environment files spell them
fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Ok(true),
        "0" | "f" | "false" => Ok(false),
        other => Err(ShimError::Configuration(format!(
            "Invalid boolean '{other}' for USE_PROXY"
        ))),
    }
}
