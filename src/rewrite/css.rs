//! CSS `url(...)` rule for isolated attribute and style values
//!
//! Unlike the stream passes this rule sees the whole value at once, so it
//! captures the URL body and hands it to a [`UrlFixer`]. Only the body is
//! replaced; the `url(`, quotes, whitespace and `)` around it are kept as-is.

use super::fixer::UrlFixer;
use super::rules::{skip_whitespace, starts_with_ignore_case};
use crate::config::FilterConfig;
use crate::error::Result;
use log::debug;
use std::ops::Range;
use url::Url;

/// A matched `url(...)` token
#[derive(Debug, Clone, PartialEq, Eq)]
struct CssUrlToken {
    /// Byte range of the captured URL body
    body: Range<usize>,
    /// End of the whole token (just past `)`)
    end: usize,
}

/// Rewrite every `url(...)` in `css` that the fixer says needs fixing.
///
/// Unbalanced tokens are left untouched. Errors from the fixer propagate.
pub fn fix_css(
    css: &str,
    base: &Url,
    config: &FilterConfig,
    fixer: &dyn UrlFixer,
) -> Result<String> {
    let mut out = String::with_capacity(css.len());
    let mut copied = 0;
    let mut pos = 0;

    while pos < css.len() {
        let Some(token) = css_url_at(css, pos) else {
            pos += 1;
            continue;
        };

        let raw = &css[token.body.clone()];
        let url = raw.trim();
        if url.len() != raw.len() {
            debug!("caught extra whitespace around url({:?})", raw);
        }

        if fixer.needs_fixed(url, config) {
            let fixed = fixer.fix_url(config, url, base)?;
            let leading = raw.len() - raw.trim_start().len();
            let trailing = raw.trim_end().len();

            out.push_str(&css[copied..token.body.start]);
            out.push_str(&raw[..leading]);
            out.push_str(&fixed);
            out.push_str(&raw[trailing..]);
            copied = token.body.end;
        }

        pos = token.end;
    }

    out.push_str(&css[copied..]);
    Ok(out)
}

/// `url` ws* `(` ws* quote? body quote? ws* `)`, body being one or more
/// characters other than quotes and `)`
fn css_url_at(css: &str, at: usize) -> Option<CssUrlToken> {
    let bytes = css.as_bytes();
    if !starts_with_ignore_case(bytes, at, b"url") {
        return None;
    }

    let mut pos = skip_whitespace(css, at + 3);
    if bytes.get(pos) != Some(&b'(') {
        return None;
    }
    pos = skip_whitespace(css, pos + 1);
    if matches!(bytes.get(pos), Some(b'"' | b'\'')) {
        pos += 1;
    }

    let body_start = pos;
    let body_len = css[pos..]
        .find(|c: char| matches!(c, '\'' | '"' | ')'))
        .unwrap_or(css.len() - pos);
    if body_len == 0 {
        return None;
    }
    let body_end = body_start + body_len;

    pos = body_end;
    if matches!(bytes.get(pos), Some(b'"' | b'\'')) {
        pos += 1;
    }
    pos = skip_whitespace(css, pos);
    if bytes.get(pos) != Some(&b')') {
        return None;
    }

    Some(CssUrlToken {
        body: body_start..body_end,
        end: pos + 1,
    })
}
