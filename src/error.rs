//! Error types for the rewrite filter

use thiserror::Error;

/// Errors raised while rewriting URLs or driving a rewrite stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewriteError {
    /// A captured URL could not be resolved against the base URL
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The original request URL could not be parsed
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// The request path does not carry the proxy prefix
    #[error("Path '{0}' is not behind the proxy prefix")]
    NotProxied(String),

    /// A chunk arrived after the stream was flushed or aborted
    #[error("Rewrite stream already closed")]
    StreamClosed,
}

impl RewriteError {
    pub fn invalid_url(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_base_url(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidBaseUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

/// Configuration parsing errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RewriteError>;
