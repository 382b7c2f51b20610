//! Gateway configuration types.
//!
//! This module defines configuration structures for the HTTP/SSE gateway.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Configuration for the gateway service.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Directory holding the RocksDB database.
    #[serde(default = "GatewayConfig::default_data_dir")]
    pub data_dir: PathBuf,

    /// Allowed CORS origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    #[serde(default = "GatewayConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Request timeout in seconds. Streaming responses are bounded only until
    /// their headers are sent.
    #[serde(default = "GatewayConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    fn default_data_dir() -> PathBuf {
        PathBuf::from("/var/lib/arcadia/db")
    }

    const fn default_max_body() -> usize {
        1024 * 1024 // 1 MB
    }

    const fn default_request_timeout() -> u64 {
        60
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `LISTEN_ADDR`: Address to bind
    /// - `DATA_DIR`: RocksDB directory
    /// - `CORS_ORIGINS`: Comma-separated allowed origins
    /// - `MAX_BODY_BYTES`: Request body limit
    /// - `REQUEST_TIMEOUT_SECS`: Request timeout
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("LISTEN_ADDR") {
            config.listen_addr = val;
        }
        if let Ok(val) = std::env::var("DATA_DIR") {
            config.data_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("CORS_ORIGINS") {
            config.cors_origins = val
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(val) = std::env::var("MAX_BODY_BYTES") {
            if let Ok(bytes) = val.parse() {
                config.max_body_bytes = bytes;
            }
        }
        if let Ok(val) = std::env::var("REQUEST_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.request_timeout_seconds = secs;
            }
        }

        config
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            data_dir: Self::default_data_dir(),
            cors_origins: vec!["*".to_string()],
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.cors_origins, vec!["*"]);
        assert_eq!(config.max_body_bytes, 1024 * 1024);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn deserialize_uses_field_defaults() {
        let config: GatewayConfig =
            serde_json::from_str(r#"{"listen_addr": "127.0.0.1:9000"}"#).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/arcadia/db"));
        assert!(config.cors_origins.is_empty());
        assert_eq!(config.request_timeout_seconds, 60);
    }
}
