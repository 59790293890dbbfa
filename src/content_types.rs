//! Response content-type classification

use crate::config::FilterConfig;

/// How a response body is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Stylesheet: rewritten as a whole stream
    Css,
    /// HTML: rewritten through tag/style events
    Html,
    /// Anything else passes through untouched
    Other,
}

impl ContentKind {
    /// Classify a `content-type` header value, ignoring parameters and case
    pub fn classify(content_type: &str, config: &FilterConfig) -> Self {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if config.css_content_types.iter().any(|t| t.eq_ignore_ascii_case(&mime)) {
            ContentKind::Css
        } else if config.html_content_types.iter().any(|t| t.eq_ignore_ascii_case(&mime)) {
            ContentKind::Html
        } else {
            ContentKind::Other
        }
    }
}

/// Whether a `content-encoding` header value leaves the body as plain text.
///
/// A missing header is passed as the empty string.
pub fn is_identity_encoding(content_encoding: &str) -> bool {
    content_encoding
        .split(',')
        .map(str::trim)
        .filter(|coding| !coding.is_empty())
        .all(|coding| coding.eq_ignore_ascii_case("identity"))
}
