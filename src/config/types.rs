use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// HTTP resource configuration
    pub api: ApiConfig,

    /// Live feed configuration
    pub stream: StreamSettings,

    /// Stats poller configuration
    pub poller: PollerSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// HTTP resource configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Origin the dashboard is served from. Used as the API base when
    /// `base_url` is unset, and as the host of the default live-feed URL.
    pub origin: String,

    /// Explicit API base URL
    pub base_url: Option<String>,

    /// Per-request timeout in seconds
    pub request_timeout_secs: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3000".to_string(),
            base_url: None,
            request_timeout_secs: Some(30),
        }
    }
}

/// Live feed configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Explicit live-feed base URL (`ws://` or `wss://`)
    pub base_url: Option<String>,

    /// Port of the default live-feed URL
    pub port: u16,

    /// Path appended to the base URL
    pub path: String,

    /// Number of events kept in memory
    pub buffer_capacity: usize,

    /// Fixed wait before every reconnect attempt
    pub reconnect_delay_ms: u64,

    /// Dial timeout; a timed-out dial counts as a connection loss
    pub connect_timeout_secs: Option<u64>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            port: 8000,
            path: "/ws/logs".to_string(),
            buffer_capacity: 100,
            reconnect_delay_ms: 3000,
            connect_timeout_secs: None,
        }
    }
}

/// Stats poller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerSettings {
    /// Interval between scheduled fetches
    pub interval_ms: u64,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format
    pub format: LogFormat,

    /// Directory for daily-rotated log files; console only when unset
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            directory: None,
        }
    }
}

impl SyncConfig {
    /// Base URL for HTTP resources, without trailing slash
    pub fn api_base_url(&self) -> Result<String> {
        let raw = self.api.base_url.as_deref().unwrap_or(&self.api.origin);
        let url = Url::parse(raw)?;
        match url.scheme() {
            "http" | "https" => Ok(raw.trim_end_matches('/').to_string()),
            other => Err(Error::Config(format!(
                "API base URL must be http or https, got {other}"
            ))),
        }
    }

    /// Base URL for the live feed, without trailing slash.
    ///
    /// Defaults to the origin's host on the configured port.
    pub fn feed_base_url(&self) -> Result<String> {
        if let Some(raw) = self.stream.base_url.as_deref() {
            let url = Url::parse(raw)?;
            return match url.scheme() {
                "ws" | "wss" => Ok(raw.trim_end_matches('/').to_string()),
                other => Err(Error::Config(format!(
                    "live feed URL must be ws or wss, got {other}"
                ))),
            };
        }

        let origin = Url::parse(&self.api.origin)?;
        let host = origin
            .host_str()
            .ok_or_else(|| Error::Config(format!("origin has no host: {}", self.api.origin)))?;
        let scheme = if origin.scheme() == "https" { "wss" } else { "ws" };
        Ok(format!("{scheme}://{host}:{}", self.stream.port))
    }

    /// Full live-feed URL
    pub fn feed_url(&self) -> Result<Url> {
        let base = self.feed_base_url()?;
        Ok(Url::parse(&format!("{base}{}", self.stream.path))?)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.stream.reconnect_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poller.interval_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.api.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.stream.connect_timeout_secs.map(Duration::from_secs)
    }

    /// Reject values the components cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.stream.buffer_capacity == 0 {
            return Err(Error::Config("stream.buffer_capacity must be > 0".into()));
        }
        if self.poller.interval_ms == 0 {
            return Err(Error::Config("poller.interval_ms must be > 0".into()));
        }
        if !self.stream.path.starts_with('/') {
            return Err(Error::Config(format!(
                "stream.path must start with '/': {}",
                self.stream.path
            )));
        }
        self.api_base_url()?;
        self.feed_url()?;
        Ok(())
    }
}
