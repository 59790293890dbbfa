//! Streaming module for chunk-by-chunk body rewriting
//!
//! This module provides streaming primitives that:
//! - Handle UTF-8 boundaries across chunks
//! - Hold back trailing partial URL tokens until the next chunk
//! - Flush the remainder exactly once at end of stream

pub mod body_rewriter;
pub mod chunk_rewriter;
pub mod utf8_buffer;

pub use body_rewriter::BodyRewriter;
pub use chunk_rewriter::{partial_tail_start, ChunkedRewriter, StreamState};
pub use utf8_buffer::Utf8Buffer;
