//! Chunked Stream Rewriter
//!
//! CRITICAL: A URL can straddle a chunk boundary. The trailing token of
//! every chunk is held back and prepended to the next chunk, so the rule
//! engine never sees a truncated token. Everything before that token is
//! rewritten and emitted immediately.
//!
//! Memory is bounded by roughly one token per stream.

use crate::error::{Result, RewriteError};
use crate::rewrite::{rewrite, RewriteContext};
use log::debug;

/// Lifecycle of one rewrite stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Accepting chunks
    Open,
    /// End of stream seen, remainder emitted
    Flushed,
    /// Upstream ended without end of stream, remainder discarded
    Aborted,
}

/// Rewrites one text stream chunk by chunk
pub struct ChunkedRewriter {
    context: RewriteContext,
    /// Trailing partial token withheld from the previous chunk
    pending: Option<String>,
    state: StreamState,
    bytes_in: usize,
    bytes_out: usize,
}

impl ChunkedRewriter {
    pub fn new(context: RewriteContext) -> Self {
        Self {
            context,
            pending: None,
            state: StreamState::Open,
            bytes_in: 0,
            bytes_out: 0,
        }
    }

    /// Process the next chunk and return the text that is safe to emit.
    ///
    /// The returned text may be shorter than the chunk (a tail is held
    /// back) or longer (a previous tail is released).
    pub fn push(&mut self, chunk: &str) -> Result<String> {
        if self.state != StreamState::Open {
            return Err(RewriteError::StreamClosed);
        }
        if chunk.is_empty() {
            return Ok(String::new());
        }
        self.bytes_in += chunk.len();

        let mut buf = self.pending.take().unwrap_or_default();
        buf.push_str(chunk);

        if let Some(at) = partial_tail_start(&buf) {
            let tail = buf.split_off(at);
            debug!("holding back {} bytes of partial token", tail.len());
            self.pending = Some(tail);
        }

        let out = rewrite(&buf, &self.context);
        self.bytes_out += out.len();
        Ok(out)
    }

    /// End of stream: rewrite and return the withheld remainder.
    ///
    /// Only the first call emits anything.
    pub fn finish(&mut self) -> String {
        if self.state != StreamState::Open {
            return String::new();
        }
        self.state = StreamState::Flushed;

        let out = self
            .pending
            .take()
            .map(|rest| rewrite(&rest, &self.context))
            .unwrap_or_default();
        self.bytes_out += out.len();
        out
    }

    /// Upstream terminated early: drop the remainder instead of emitting it.
    /// Returns the number of bytes discarded.
    pub fn abort(&mut self) -> usize {
        if self.state == StreamState::Open {
            self.state = StreamState::Aborted;
        }
        self.pending.take().map_or(0, |rest| rest.len())
    }

    /// Process a chunk, flushing the remainder when `end_of_stream` is set
    pub fn on_body_chunk(&mut self, chunk: &str, end_of_stream: bool) -> Result<String> {
        let mut out = self.push(chunk)?;
        if end_of_stream {
            out.push_str(&self.finish());
        }
        Ok(out)
    }

    /// The currently withheld remainder
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn context(&self) -> &RewriteContext {
        &self.context
    }

    /// Total bytes accepted
    pub fn bytes_in(&self) -> usize {
        self.bytes_in
    }

    /// Total bytes emitted
    pub fn bytes_out(&self) -> usize {
        self.bytes_out
    }
}

/// Start of the trailing token that may still grow into a URL.
///
/// The token is the last run of non-whitespace characters with any trailing
/// whitespace, plus the single whitespace character before it. When that
/// whitespace directly follows `url(`, the word carrying the `url(` is held
/// back too, since `url(` + whitespace continues into the next word.
/// Returns `None` when the buffer is empty or all whitespace.
pub fn partial_tail_start(buf: &str) -> Option<usize> {
    let mut end = buf.trim_end().len();
    if end == 0 {
        return None;
    }

    loop {
        let Some((ws, _)) = buf[..end]
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
        else {
            // One unbroken word: hold back everything
            return Some(0);
        };

        let run_start = buf[..ws].trim_end().len();
        if !ends_with_url_open(&buf[..run_start]) {
            return Some(ws);
        }
        end = run_start;
    }
}

fn ends_with_url_open(text: &str) -> bool {
    text.len()
        .checked_sub(4)
        .and_then(|at| text.get(at..))
        .is_some_and(|tail| tail.eq_ignore_ascii_case("url("))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PREFIX: &str = "/proxy/";

    fn ctx() -> RewriteContext {
        RewriteContext::parse("https://site.test/css/main.css", PREFIX).unwrap()
    }

    fn stream(chunks: &[&str]) -> String {
        let mut rewriter = ChunkedRewriter::new(ctx());
        let mut out = String::new();
        for chunk in chunks {
            out.push_str(&rewriter.push(chunk).unwrap());
        }
        out.push_str(&rewriter.finish());
        out
    }

    #[test]
    fn test_partial_tail_start() {
        assert_eq!(partial_tail_start(""), None);
        assert_eq!(partial_tail_start("   \n"), None);
        assert_eq!(partial_tail_start("word"), Some(0));
        assert_eq!(partial_tail_start("a { b: c"), Some(6));
        assert_eq!(partial_tail_start("a  href=  "), Some(2));
        assert_eq!(partial_tail_start("x url(  //cdn"), Some(1));
        assert_eq!(partial_tail_start("x URL( /a"), Some(1));
        assert_eq!(partial_tail_start("x url(/a"), Some(1));
        assert_eq!(partial_tail_start("xurl( /a"), Some(0));
        assert_eq!(partial_tail_start("a url( url( //b"), Some(1));
    }

    #[test]
    fn test_url_split_across_chunks() {
        let out = stream(&["a { background: url(", "/img/", "bg.png); }"]);
        assert_eq!(
            out,
            "a { background: url(/proxy/https://site.test/img/bg.png); }"
        );
    }

    #[test]
    fn test_scheme_split_across_chunks() {
        let out = stream(&["<img src=\"ht", "tp://x.test/a.png\">"]);
        assert_eq!(out, "<img src=\"/proxy/http://x.test/a.png\">");
    }

    #[test]
    fn test_whitespace_inside_url_open_split() {
        let out = stream(&["b { c: url(  ", "  //cdn.test/a.png) }"]);
        assert_eq!(out, "b { c: url(    /proxy/https://cdn.test/a.png) }");
    }

    #[test]
    fn test_word_ending_in_url_open_held_back() {
        let whole = "<a href=/url( x";
        assert_eq!(stream(&["<a href=/url( ", "x"]), rewrite(whole, &ctx()));
        assert_eq!(stream(&["<a href=/url( x"]), "<a href=/proxy/https://site.test/url( x");
    }

    #[test]
    fn test_prefix_emitted_immediately() {
        let mut rewriter = ChunkedRewriter::new(ctx());
        let out = rewriter.push("a { color: red; } b { background: url(").unwrap();
        assert_eq!(out, "a { color: red; } b { background:");
        assert_eq!(rewriter.pending(), Some(" url("));
    }

    #[test]
    fn test_single_word_chunk_withheld() {
        let mut rewriter = ChunkedRewriter::new(ctx());
        assert_eq!(rewriter.push("averyveryverylongtoken").unwrap(), "");
        assert_eq!(rewriter.pending(), Some("averyveryverylongtoken"));
        assert_eq!(rewriter.finish(), "averyveryverylongtoken");
    }

    #[test]
    fn test_flush_emits_remainder_once() {
        let mut rewriter = ChunkedRewriter::new(ctx());
        let mut out = rewriter.push("a{b:").unwrap();
        out.push_str(&rewriter.push("url(").unwrap());
        assert_eq!(out, "");

        assert_eq!(rewriter.finish(), "a{b:url(");
        assert_eq!(rewriter.state(), StreamState::Flushed);
        assert_eq!(rewriter.finish(), "");
    }

    #[test]
    fn test_flush_rewrites_complete_remainder() {
        let mut rewriter = ChunkedRewriter::new(ctx());
        assert_eq!(rewriter.push("x url(/a.png)").unwrap(), "x");
        assert_eq!(rewriter.finish(), " url(/proxy/https://site.test/a.png)");
    }

    #[test]
    fn test_flush_without_remainder() {
        let mut rewriter = ChunkedRewriter::new(ctx());
        assert_eq!(rewriter.push("a\n").unwrap(), "");
        assert_eq!(rewriter.finish(), "a\n");

        let mut empty = ChunkedRewriter::new(ctx());
        assert_eq!(empty.finish(), "");
    }

    #[test]
    fn test_whitespace_only_chunk_emitted() {
        let mut rewriter = ChunkedRewriter::new(ctx());
        assert_eq!(rewriter.push(" \n\t").unwrap(), " \n\t");
        assert_eq!(rewriter.pending(), None);
    }

    #[test]
    fn test_empty_chunk_keeps_remainder() {
        let mut rewriter = ChunkedRewriter::new(ctx());
        rewriter.push("a url(").unwrap();
        assert_eq!(rewriter.push("").unwrap(), "");
        assert_eq!(rewriter.pending(), Some(" url("));
    }

    #[test]
    fn test_abort_discards_remainder() {
        let mut rewriter = ChunkedRewriter::new(ctx());
        rewriter.push("a { b: url(/partial").unwrap();
        assert_eq!(rewriter.abort(), " url(/partial".len());
        assert_eq!(rewriter.state(), StreamState::Aborted);
        assert_eq!(rewriter.finish(), "");
        assert_eq!(rewriter.push("more"), Err(RewriteError::StreamClosed));
    }

    #[test]
    fn test_push_after_finish() {
        let mut rewriter = ChunkedRewriter::new(ctx());
        rewriter.finish();
        assert_eq!(rewriter.push("a"), Err(RewriteError::StreamClosed));
    }

    #[test]
    fn test_on_body_chunk() {
        let mut rewriter = ChunkedRewriter::new(ctx());
        let first = rewriter.on_body_chunk("a{b:url(", false).unwrap();
        let last = rewriter.on_body_chunk("//cdn.test/x.png)}", true).unwrap();
        assert_eq!(
            format!("{}{}", first, last),
            "a{b:url(/proxy/https://cdn.test/x.png)}"
        );
        assert_eq!(rewriter.state(), StreamState::Flushed);
        assert_eq!(rewriter.bytes_in(), "a{b:url(//cdn.test/x.png)}".len());
        assert_eq!(rewriter.bytes_out(), "a{b:url(/proxy/https://cdn.test/x.png)}".len());
    }

    #[test]
    fn test_streams_are_independent() {
        let mut first = ChunkedRewriter::new(ctx());
        let mut second = ChunkedRewriter::new(
            RewriteContext::parse("http://other.test/", PREFIX).unwrap(),
        );

        first.push("a url(").unwrap();
        second.push("b url(").unwrap();

        assert_eq!(
            first.on_body_chunk("/x)", true).unwrap(),
            " url(/proxy/https://site.test/x)"
        );
        assert_eq!(
            second.on_body_chunk("/x)", true).unwrap(),
            " url(/proxy/http://other.test/x)"
        );
    }

    const FRAGMENTS: &[&str] = &[
        "url(", "URL( ", "href=", "src=", "action=", "\"", "'", "=", "/", "//", "http:",
        "https:", "cdn.test", "a.png", "/proxy/", " ", "  ", "\n", "\t", "x", ")", ";",
        "{", "}", "é", "☕",
    ];

    fn split_at_boundaries<'a>(text: &'a str, cuts: &[prop::sample::Index]) -> Vec<&'a str> {
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let mut points: Vec<usize> = cuts.iter().map(|c| *c.get(&boundaries)).collect();
        points.sort_unstable();
        points.dedup();

        let mut chunks = Vec::with_capacity(points.len() + 1);
        let mut last = 0;
        for point in points {
            chunks.push(&text[last..point]);
            last = point;
        }
        chunks.push(&text[last..]);
        chunks
    }

    proptest! {
        #[test]
        fn prop_chunked_output_matches_whole_rewrite(
            parts in prop::collection::vec(prop::sample::select(FRAGMENTS), 0..40),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..10),
        ) {
            let text = parts.concat();
            let chunks = split_at_boundaries(&text, &cuts);
            prop_assert_eq!(stream(&chunks), rewrite(&text, &ctx()));
        }

        #[test]
        fn prop_one_char_chunks_match_whole_rewrite(
            parts in prop::collection::vec(prop::sample::select(FRAGMENTS), 0..30),
        ) {
            let text = parts.concat();
            let chunks: Vec<String> = text.chars().map(String::from).collect();
            let chunks: Vec<&str> = chunks.iter().map(String::as_str).collect();
            prop_assert_eq!(stream(&chunks), rewrite(&text, &ctx()));
        }

        #[test]
        fn prop_no_data_loss_without_matches(
            text in "[a-z0-9 .,;:{}\n]{0,200}",
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..10),
        ) {
            let chunks = split_at_boundaries(&text, &cuts);
            prop_assert_eq!(stream(&chunks), text);
        }
    }
}
