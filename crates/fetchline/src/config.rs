//! Client configuration, loadable from a TOML file.
//!
//! ```toml
//! base_url = "http://localhost:3000"
//! timeout_ms = 10000
//!
//! [headers]
//! accept = "application/json"
//!
//! [event_source]
//! retry_ms = 3000
//! max_backoff_ms = 60000
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::header::HeaderMap;
use crate::Error;

/// Immutable client defaults applied to every request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Joined with the path given to each request.
    pub base_url: Option<String>,
    /// Default headers; per-call headers with the same name win.
    pub headers: BTreeMap<String, String>,
    /// Limit on waiting for the response head.
    pub timeout_ms: Option<u64>,
    pub event_source: EventSourceConfig,
}

/// Reconnection settings for [`EventSource`](crate::EventSource).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSourceConfig {
    /// Base delay before reconnecting; a server `retry:` field replaces it.
    pub retry_ms: u64,
    /// Upper bound for the doubled backoff.
    pub max_backoff_ms: u64,
}

impl Default for EventSourceConfig {
    fn default() -> Self {
        Self {
            retry_ms: 3000,
            max_backoff_ms: 60_000,
        }
    }
}

impl EventSourceConfig {
    pub fn retry(&self) -> Duration {
        Duration::from_millis(self.retry_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl ClientConfig {
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, Error> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, Error> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn default_headers(&self) -> HeaderMap {
        self.headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full() {
        let config = ClientConfig::from_toml_str(
            r#"
base_url = "http://localhost:3000"
timeout_ms = 2500

[headers]
accept = "application/json"
x-client = "fetchline"

[event_source]
retry_ms = 500
"#,
        )
        .unwrap();

        assert_eq!(config.base_url.as_deref(), Some("http://localhost:3000"));
        assert_eq!(config.timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.default_headers().get("X-Client"), Some("fetchline"));
        assert_eq!(config.event_source.retry(), Duration::from_millis(500));
        assert_eq!(config.event_source.max_backoff_ms, 60_000);
    }

    #[test]
    fn parse_empty_uses_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.event_source.retry_ms, 3000);
        assert!(config.timeout().is_none());
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = ClientConfig::from_toml_str("timeout_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = ClientConfig::from_file(Path::new("/nonexistent/fetchline.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn toml_round_trip() {
        let config = ClientConfig::default()
            .with_base_url("http://api.test")
            .with_header("accept", "*/*")
            .with_timeout(Duration::from_secs(3));
        let text = config.to_toml_string().unwrap();
        assert_eq!(ClientConfig::from_toml_str(&text).unwrap(), config);
    }
}
