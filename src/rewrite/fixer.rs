//! URL delegate used by the CSS `url(...)` rule

use super::rules::is_proxied;
use crate::config::FilterConfig;
use crate::error::{Result, RewriteError};
use url::Url;

/// URI schemes that must never be routed through the proxy
const PASSTHROUGH_SCHEMES: [&str; 5] = ["data:", "javascript:", "about:", "mailto:", "blob:"];

/// Decides whether a captured URL needs fixing and computes its replacement
pub trait UrlFixer {
    /// Whether `url` should be routed through the proxy
    fn needs_fixed(&self, url: &str, config: &FilterConfig) -> bool;

    /// Compute the proxied form of `url`, resolved against `base`
    fn fix_url(&self, config: &FilterConfig, url: &str, base: &Url) -> Result<String>;
}

/// Resolves URLs against the page URL and prepends the proxy prefix
#[derive(Clone, Copy, Debug, Default)]
pub struct PrefixUrlFixer;

impl UrlFixer for PrefixUrlFixer {
    fn needs_fixed(&self, url: &str, config: &FilterConfig) -> bool {
        if url.is_empty() || url.starts_with('#') {
            return false;
        }
        if is_proxied(url, 0, &config.prefix) {
            return false;
        }

        let lower = url.to_ascii_lowercase();
        !PASSTHROUGH_SCHEMES.iter().any(|s| lower.starts_with(s))
    }

    fn fix_url(&self, config: &FilterConfig, url: &str, base: &Url) -> Result<String> {
        let resolved = base
            .join(url)
            .map_err(|e| RewriteError::invalid_url(url, e))?;

        match resolved.scheme() {
            "http" | "https" => Ok(format!("{}{}", config.prefix, resolved)),
            _ => Ok(url.to_string()),
        }
    }
}
