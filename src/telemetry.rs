//! Telemetry Module for the CSS rewrite filter
//!
//! In Wasm, we emit structured logs that can be collected by
//! Envoy's access logging or external collectors.

use log::{info, warn};
use serde::Serialize;

/// Audit event types
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteEventType {
    /// Stylesheet body rewritten to the end
    StreamRewritten,
    /// Stream ended without end of stream, remainder dropped
    StreamAborted,
    /// Response not rewritten (content type or path)
    ResponseSkipped,
    /// A rewrite error left content unrewritten
    RewriteFailed,
}

/// Audit event for logging
#[derive(Debug, Clone, Serialize)]
pub struct RewriteEvent {
    pub event_type: RewriteEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<u32>,
    /// Original URL being proxied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_in: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_out: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RewriteEvent {
    pub fn new(event_type: RewriteEventType) -> Self {
        Self {
            event_type,
            context_id: None,
            origin: None,
            content_type: None,
            bytes_in: None,
            bytes_out: None,
            reason: None,
        }
    }

    pub fn with_context_id(mut self, id: u32) -> Self {
        self.context_id = Some(id);
        self
    }

    pub fn with_origin(mut self, origin: &str) -> Self {
        self.origin = Some(origin.to_string());
        self
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    /// Set byte counts in and out of the rewriter
    pub fn with_bytes(mut self, bytes_in: usize, bytes_out: usize) -> Self {
        self.bytes_in = Some(bytes_in);
        self.bytes_out = Some(bytes_out);
        self
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    /// Log the event
    pub fn emit(&self) {
        // Serialize to JSON for structured logging
        match serde_json::to_string(self) {
            Ok(json) => match self.event_type {
                RewriteEventType::StreamAborted | RewriteEventType::RewriteFailed => {
                    warn!("[CSS-REWRITE-AUDIT] {}", json);
                }
                _ => {
                    info!("[CSS-REWRITE-AUDIT] {}", json);
                }
            },
            Err(e) => {
                warn!("Failed to serialize audit event: {}", e);
            }
        }
    }
}

/// Create a completed stream audit event
pub fn audit_stream_rewritten(bytes_in: usize, bytes_out: usize) -> RewriteEvent {
    RewriteEvent::new(RewriteEventType::StreamRewritten).with_bytes(bytes_in, bytes_out)
}

/// Create an aborted stream audit event
pub fn audit_stream_aborted(discarded: usize) -> RewriteEvent {
    RewriteEvent::new(RewriteEventType::StreamAborted)
        .with_reason(&format!("{} pending bytes discarded", discarded))
}

/// Create a skipped response audit event
pub fn audit_skipped(content_type: &str) -> RewriteEvent {
    RewriteEvent::new(RewriteEventType::ResponseSkipped).with_content_type(content_type)
}

/// Create a failed rewrite audit event
pub fn audit_failed(reason: &str) -> RewriteEvent {
    RewriteEvent::new(RewriteEventType::RewriteFailed).with_reason(reason)
}
