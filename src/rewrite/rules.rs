//! Ordered URL insertion passes
//!
//! Three passes run in a fixed order, each over the output of the previous one:
//! - protocol-relative `//host` gets the origin scheme
//! - root-relative `/path` gets the origin `scheme://host`
//! - absolute `http:`/`https:` gets the proxy prefix
//!
//! A pass only inserts text at a single point in front of a URL, so it never
//! needs to know where the URL ends. Matching is ASCII case-insensitive
//! scanning (no regex in Wasm).

use super::context::RewriteContext;

/// Attribute openers recognised by the root-relative pass
const ROOT_RELATIVE_ATTRIBUTES: [&[u8]; 3] = [b"href=", b"src=", b"action="];

/// A single rewrite pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// `"//cdn.test` -> `"https://cdn.test`
    ProtocolRelative,
    /// `href="/a.html` -> `href="https://site.test/a.html`
    RootRelative,
    /// `"https://x.test` -> `"/proxy/https://x.test`
    Absolute,
}

impl Pass {
    /// Passes in application order. Later passes rely on earlier ones having
    /// disambiguated `//host` from `/path`.
    pub const ORDER: [Pass; 3] = [Pass::ProtocolRelative, Pass::RootRelative, Pass::Absolute];

    /// Apply this pass to `text`, scanning from its start
    pub fn apply(&self, text: &str, ctx: &RewriteContext) -> String {
        match self {
            Pass::ProtocolRelative => {
                let scheme = format!("{}:", ctx.scheme());
                insert_at_matches(text, &scheme, protocol_relative_at)
            }
            Pass::RootRelative => {
                let origin = ctx.origin();
                insert_at_matches(text, &origin, |t, at| root_relative_at(t, at, ctx.prefix()))
            }
            Pass::Absolute => {
                insert_at_matches(text, ctx.prefix(), |t, at| absolute_at(t, at, ctx.prefix()))
            }
        }
    }
}

/// Redirect every recognisable URL reference in `text` through the proxy.
///
/// Total over any input; the empty string rewrites to itself.
pub fn rewrite(text: &str, ctx: &RewriteContext) -> String {
    Pass::ORDER
        .iter()
        .fold(text.to_string(), |acc, pass| pass.apply(&acc, ctx))
}

/// Where a pass matched: insertion point and the end of the matched text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Match {
    insert_at: usize,
    end: usize,
}

/// Insert `insert` at every match point, scanning left to right without overlap
fn insert_at_matches<F>(text: &str, insert: &str, find: F) -> String
where
    F: Fn(&str, usize) -> Option<Match>,
{
    let mut out = String::with_capacity(text.len() + insert.len());
    let mut copied = 0;
    let mut pos = 0;

    while pos < text.len() {
        match find(text, pos) {
            Some(m) => {
                out.push_str(&text[copied..m.insert_at]);
                out.push_str(insert);
                copied = m.insert_at;
                pos = m.end;
            }
            // Patterns start with ASCII bytes, so stepping through
            // continuation bytes never yields a match.
            None => pos += 1,
        }
    }

    out.push_str(&text[copied..]);
    out
}

pub(crate) fn starts_with_ignore_case(bytes: &[u8], at: usize, needle: &[u8]) -> bool {
    bytes
        .get(at..at + needle.len())
        .is_some_and(|s| s.eq_ignore_ascii_case(needle))
}

/// First non-whitespace position at or after `at` (which must be a char boundary)
pub(crate) fn skip_whitespace(text: &str, at: usize) -> usize {
    text[at..]
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map_or(text.len(), |(i, _)| at + i)
}

/// Whether `text[at..]` is already routed through the proxy: the prefix
/// followed by an absolute `http:`/`https:` URL.
pub(crate) fn is_proxied(text: &str, at: usize, prefix: &str) -> bool {
    if prefix.is_empty() || !text[at..].starts_with(prefix) {
        return false;
    }
    let bytes = text.as_bytes();
    let target = at + prefix.len();
    starts_with_ignore_case(bytes, target, b"http:")
        || starts_with_ignore_case(bytes, target, b"https:")
}

#[inline]
fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// `"`, `'`, `=`, or `url(` plus optional whitespace. Returns the position
/// right after the delimiter.
fn url_delimiter_end(text: &str, at: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    match bytes[at] {
        b'"' | b'\'' | b'=' => Some(at + 1),
        _ if starts_with_ignore_case(bytes, at, b"url(") => Some(skip_whitespace(text, at + 4)),
        _ => None,
    }
}

fn protocol_relative_at(text: &str, at: usize) -> Option<Match> {
    let start = url_delimiter_end(text, at)?;
    let bytes = text.as_bytes();

    if !bytes[start..].starts_with(b"//") || !is_word_byte(*bytes.get(start + 2)?) {
        return None;
    }

    Some(Match {
        insert_at: start,
        end: start + 3,
    })
}

fn root_relative_at(text: &str, at: usize, prefix: &str) -> Option<Match> {
    let bytes = text.as_bytes();

    let mut start = if let Some(attr) = ROOT_RELATIVE_ATTRIBUTES
        .iter()
        .find(|attr| starts_with_ignore_case(bytes, at, attr))
    {
        at + attr.len()
    } else if starts_with_ignore_case(bytes, at, b"url(") {
        skip_whitespace(text, at + 4)
    } else {
        return None;
    };

    if matches!(bytes.get(start), Some(b'"' | b'\'')) {
        start += 1;
    }
    if bytes.get(start) != Some(&b'/') {
        return None;
    }

    let next = text[start + 1..].chars().next()?;
    // `/` then whitespace is left alone: a match must never span whitespace
    // or a chunk split between the two would rewrite differently.
    if next == '/' || next.is_whitespace() {
        return None;
    }
    if is_proxied(text, start, prefix) {
        return None;
    }

    Some(Match {
        insert_at: start,
        end: start + 1 + next.len_utf8(),
    })
}

fn absolute_at(text: &str, at: usize, prefix: &str) -> Option<Match> {
    let start = url_delimiter_end(text, at)?;
    let bytes = text.as_bytes();

    let scheme_len = if starts_with_ignore_case(bytes, start, b"http:") {
        5
    } else if starts_with_ignore_case(bytes, start, b"https:") {
        6
    } else {
        return None;
    };

    // An absolute prefix looks like a bare URL itself
    if is_proxied(text, start, prefix) {
        return None;
    }

    Some(Match {
        insert_at: start,
        end: start + scheme_len,
    })
}
