//! Runtime configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::dispatch::encoder::Charset;

/// Process-wide configuration, read-only once the server starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Expose stack traces in error responses and mid-stream failures.
    pub debug: bool,
    /// Status codes whose responses never carry a body.
    pub no_content_statuses: BTreeSet<u16>,
    /// Charset used to encode text chunks.
    pub response_charset: Charset,
    /// Content type declared on error responses.
    pub error_content_type: String,
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            debug: false,
            no_content_statuses: BTreeSet::from([204, 304]),
            response_charset: Charset::Utf8,
            error_content_type: "text/plain".to_string(),
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

impl AppConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host address.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Toggle debug mode.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Replace the set of no-content status codes.
    pub fn no_content_statuses(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.no_content_statuses = codes.into_iter().collect();
        self
    }

    pub fn response_charset(mut self, charset: Charset) -> Self {
        self.response_charset = charset;
        self
    }

    pub fn error_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.error_content_type = content_type.into();
        self
    }

    pub fn max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Whether responses with this code must have an empty body.
    pub fn is_no_content(&self, code: u16) -> bool {
        self.no_content_statuses.contains(&code)
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AppConfig::new();
        assert!(!config.debug);
        assert!(config.is_no_content(304));
        assert!(config.is_no_content(204));
        assert!(!config.is_no_content(200));
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.error_content_type, "text/plain");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"debug": true, "response_charset": "iso-8859-1"}"#).unwrap();
        assert!(config.debug);
        assert_eq!(config.response_charset, Charset::Latin1);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn builder_overrides() {
        let config = AppConfig::new()
            .port(0)
            .no_content_statuses([304])
            .error_content_type("application/json");
        assert_eq!(config.port, 0);
        assert!(!config.is_no_content(204));
        assert_eq!(config.error_content_type, "application/json");
    }
}
