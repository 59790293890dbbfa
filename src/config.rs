//! Configuration module for the CSS URL rewrite filter
//!
//! CRITICAL: Configuration is loaded from Envoy plugin configuration,
//! NOT from external files. This avoids file I/O in the Wasm sandbox.

use crate::error::ConfigError;
use serde::Deserialize;

/// Filter configuration loaded from Envoy plugin configuration
#[derive(Clone, Debug, Deserialize)]
pub struct FilterConfig {
    /// Proxy prefix prepended to redirected absolute URLs
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Content types rewritten as whole stylesheet streams
    #[serde(default = "default_css_content_types")]
    pub css_content_types: Vec<String>,

    /// Content types handled through HTML tag/style events
    #[serde(default = "default_html_content_types")]
    pub html_content_types: Vec<String>,

    /// Whether to emit audit events for rewritten responses
    #[serde(default = "default_log_rewrites")]
    pub log_rewrites: bool,
}

fn default_prefix() -> String {
    "/proxy/".to_string()
}

fn default_css_content_types() -> Vec<String> {
    vec!["text/css".to_string()]
}

fn default_html_content_types() -> Vec<String> {
    vec![
        "text/html".to_string(),
        "application/xml+xhtml".to_string(),
        "application/xhtml+xml".to_string(),
    ]
}

fn default_log_rewrites() -> bool {
    true
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            css_content_types: default_css_content_types(),
            html_content_types: default_html_content_types(),
            log_rewrites: default_log_rewrites(),
        }
    }
}

impl FilterConfig {
    /// Parse configuration from JSON bytes (from Envoy plugin configuration)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config_str = std::str::from_utf8(bytes)?;
        Ok(serde_json::from_str(config_str)?)
    }

    /// Create a configuration with a custom proxy prefix
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            ..Default::default()
        }
    }
}
