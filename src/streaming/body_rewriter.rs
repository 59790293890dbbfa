//! Byte-level body rewriter
//!
//! Glues UTF-8 boundary handling to the chunked text rewriter so the filter
//! can hand over raw Envoy body chunks.

use super::chunk_rewriter::ChunkedRewriter;
use super::utf8_buffer::Utf8Buffer;
use crate::error::Result;
use crate::rewrite::RewriteContext;

/// Rewrites a response body delivered as byte chunks
pub struct BodyRewriter {
    utf8: Utf8Buffer,
    rewriter: ChunkedRewriter,
}

impl BodyRewriter {
    pub fn new(context: RewriteContext) -> Self {
        Self {
            utf8: Utf8Buffer::new(),
            rewriter: ChunkedRewriter::new(context),
        }
    }

    /// Rewrite one body chunk. On `end_of_stream` everything still held
    /// back is flushed into the returned bytes.
    pub fn on_body_chunk(&mut self, chunk: &[u8], end_of_stream: bool) -> Result<Vec<u8>> {
        let mut text = self.utf8.decode_chunk(chunk);
        if end_of_stream {
            text.push_str(&self.utf8.finish());
        }

        let out = self.rewriter.on_body_chunk(&text, end_of_stream)?;
        Ok(out.into_bytes())
    }

    /// Drop everything held back. Returns the number of bytes discarded.
    pub fn abort(&mut self) -> usize {
        let dangling = self.utf8.pending_len();
        self.utf8.reset();
        dangling + self.rewriter.abort()
    }

    pub fn rewriter(&self) -> &ChunkedRewriter {
        &self.rewriter
    }
}
