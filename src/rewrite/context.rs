//! Per-response rewrite context

use crate::error::{Result, RewriteError};
use url::Url;

/// The original request URL plus the proxy prefix, fixed for one response
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RewriteContext {
    url: Url,
    prefix: String,
}

impl RewriteContext {
    /// Create a context from an already parsed origin URL
    pub fn new(url: Url, prefix: &str) -> Self {
        Self {
            url,
            prefix: prefix.to_string(),
        }
    }

    /// Parse the origin URL from a string
    pub fn parse(url: &str, prefix: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| RewriteError::invalid_base_url(url, e))?;
        Ok(Self::new(parsed, prefix))
    }

    /// Recover the origin URL from a proxied request path.
    ///
    /// `/proxy/https://site.test/a.css` with prefix `/proxy/` yields
    /// `https://site.test/a.css`.
    pub fn from_proxied_path(path: &str, prefix: &str) -> Result<Self> {
        let target = path
            .strip_prefix(prefix)
            .ok_or_else(|| RewriteError::NotProxied(path.to_string()))?;
        Self::parse(target, prefix)
    }

    /// Scheme of the original request, without the colon
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Host of the original request, with the port when it is not the default
    pub fn host(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Path of the original request
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// `scheme://host` of the original request
    pub fn origin(&self) -> String {
        format!("{}://{}", self.scheme(), self.host())
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origin() {
        let ctx = RewriteContext::parse("https://site.test/css/main.css", "/proxy/").unwrap();
        assert_eq!(ctx.scheme(), "https");
        assert_eq!(ctx.host(), "site.test");
        assert_eq!(ctx.path(), "/css/main.css");
        assert_eq!(ctx.origin(), "https://site.test");
    }

    #[test]
    fn test_host_keeps_non_default_port() {
        let ctx = RewriteContext::parse("http://localhost:8080/", "/proxy/").unwrap();
        assert_eq!(ctx.host(), "localhost:8080");

        let ctx = RewriteContext::parse("https://site.test:443/", "/proxy/").unwrap();
        assert_eq!(ctx.host(), "site.test");
    }

    #[test]
    fn test_from_proxied_path() {
        let ctx =
            RewriteContext::from_proxied_path("/proxy/http://example.com/a/b.css", "/proxy/")
                .unwrap();
        assert_eq!(ctx.origin(), "http://example.com");
        assert_eq!(ctx.prefix(), "/proxy/");
    }

    #[test]
    fn test_path_outside_prefix() {
        let err = RewriteContext::from_proxied_path("/static/app.css", "/proxy/").unwrap_err();
        assert!(matches!(err, RewriteError::NotProxied(_)));
    }

    #[test]
    fn test_invalid_origin() {
        let err = RewriteContext::from_proxied_path("/proxy/not a url", "/proxy/").unwrap_err();
        assert!(matches!(err, RewriteError::InvalidBaseUrl { .. }));
    }
}
