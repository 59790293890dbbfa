//! CSS URL Rewrite Wasm Filter for Envoy Proxy
//!
//! Requests arrive as `<prefix><absolute-url>`. Stylesheet responses are
//! rewritten chunk by chunk so every URL they reference is routed back
//! through the same proxy prefix.
//!
//! Targets: wasm32-wasi (Envoy proxy-wasm ABI)

pub mod config;
pub mod content_types;
pub mod error;
pub mod hooks;
pub mod rewrite;
pub mod streaming;
pub mod telemetry;

use config::FilterConfig;
use content_types::is_identity_encoding;
use hooks::{CssRewriter, ResponseData, ResponseHandling};
use log::{debug, info, warn};
use proxy_wasm::traits::{Context, HttpContext, RootContext};
use proxy_wasm::types::{Action, ContextType, LogLevel};
use rewrite::RewriteContext;
use std::cell::RefCell;
use streaming::BodyRewriter;
use telemetry::RewriteEvent;
use url::Url;

// Thread-local storage for filter configuration
thread_local! {
    static CONFIG: RefCell<FilterConfig> = RefCell::new(FilterConfig::default());
}

/// Root context for filter lifecycle management
struct RewriteRootContext {
    config: FilterConfig,
}

impl RewriteRootContext {
    fn new() -> Self {
        Self {
            config: FilterConfig::default(),
        }
    }
}

impl Context for RewriteRootContext {}

impl RootContext for RewriteRootContext {
    fn on_configure(&mut self, _plugin_configuration_size: usize) -> bool {
        if let Some(config_bytes) = self.get_plugin_configuration() {
            match FilterConfig::from_bytes(&config_bytes) {
                Ok(config) => self.config = config,
                Err(e) => {
                    warn!("Invalid filter configuration, keeping defaults: {}", e);
                }
            }
        }

        // Store config in thread-local for HTTP contexts to access
        CONFIG.with(|c| {
            *c.borrow_mut() = self.config.clone();
        });

        info!(
            "CSS Rewrite Filter initialized with prefix '{}' for {:?}",
            self.config.prefix, self.config.css_content_types
        );

        true
    }

    fn create_http_context(&self, context_id: u32) -> Option<Box<dyn HttpContext>> {
        Some(Box::new(RewriteHttpContext::new(context_id)))
    }

    fn get_type(&self) -> Option<ContextType> {
        Some(ContextType::HttpContext)
    }
}

/// Response header values that decide whether the body is rewritten
struct ResponseHeaders<'a> {
    content_type: &'a str,
    /// Empty when the header is absent
    content_encoding: &'a str,
    /// Headers-only response (HEAD, 304)
    end_of_stream: bool,
}

/// Decide how a response body is rewritten. Requests that did not come
/// through the proxy prefix have no origin and are never rewritten.
fn response_handling(
    rewriter: &CssRewriter,
    origin: Option<&Url>,
    headers: &ResponseHeaders<'_>,
) -> ResponseHandling {
    let Some(url) = origin else {
        return ResponseHandling::PassThrough;
    };
    if headers.end_of_stream {
        return ResponseHandling::PassThrough;
    }
    // CRITICAL: compressed bytes do not survive text decoding
    if !is_identity_encoding(headers.content_encoding) {
        return ResponseHandling::PassThrough;
    }

    // No HTML parser runs inside the filter, so HTML is never subscribed
    rewriter.handle_response(ResponseData {
        url: url.clone(),
        content_type: headers.content_type.to_string(),
        html: None,
    })
}

/// HTTP context for per-request processing
struct RewriteHttpContext {
    context_id: u32,
    rewriter: CssRewriter,
    /// Original URL of the proxied request
    origin: Option<Url>,
    /// Present while a stylesheet response is being rewritten
    body: Option<BodyRewriter>,
    /// Set once the rewriter has flushed
    finished: bool,
}

impl RewriteHttpContext {
    fn new(context_id: u32) -> Self {
        let config = CONFIG.with(|c| c.borrow().clone());

        Self {
            context_id,
            rewriter: CssRewriter::new(config),
            origin: None,
            body: None,
            finished: false,
        }
    }

    fn audit(&self, event: RewriteEvent) {
        if !self.rewriter.config().log_rewrites {
            return;
        }
        let event = event.with_context_id(self.context_id);
        match &self.origin {
            Some(origin) => event.with_origin(origin.as_str()).emit(),
            None => event.emit(),
        }
    }
}

impl Context for RewriteHttpContext {}

impl HttpContext for RewriteHttpContext {
    fn on_http_request_headers(&mut self, _num_headers: usize, _end_of_stream: bool) -> Action {
        let Some(path) = self.get_http_request_header(":path") else {
            return Action::Continue;
        };

        match RewriteContext::from_proxied_path(&path, &self.rewriter.config().prefix) {
            Ok(ctx) => {
                debug!(
                    "[context_id={}] Proxying {}",
                    self.context_id,
                    ctx.url()
                );
                self.origin = Some(ctx.url().clone());
                // Ask upstream for an uncompressed body we can rewrite
                self.set_http_request_header("accept-encoding", None);
            }
            Err(e) => {
                debug!(
                    "[context_id={}] Not rewriting request {}: {}",
                    self.context_id, path, e
                );
            }
        }

        Action::Continue
    }

    fn on_http_response_headers(&mut self, _num_headers: usize, end_of_stream: bool) -> Action {
        let content_type = self
            .get_http_response_header("content-type")
            .unwrap_or_default();
        let content_encoding = self
            .get_http_response_header("content-encoding")
            .unwrap_or_default();
        let headers = ResponseHeaders {
            content_type: &content_type,
            content_encoding: &content_encoding,
            end_of_stream,
        };

        match response_handling(&self.rewriter, self.origin.as_ref(), &headers) {
            ResponseHandling::Stream(body) => {
                // CRITICAL: rewritten length differs from upstream length
                self.set_http_response_header("content-length", None);
                info!(
                    "[context_id={}] Rewriting stylesheet response ({})",
                    self.context_id, content_type
                );
                self.body = Some(body);
            }
            ResponseHandling::Html | ResponseHandling::PassThrough => {
                debug!(
                    "[context_id={}] Passing through response ({}, encoding {:?}, eos: {})",
                    self.context_id, content_type, content_encoding, end_of_stream
                );
                if self.origin.is_some() && !end_of_stream {
                    let event = telemetry::audit_skipped(&content_type);
                    let event = if is_identity_encoding(&content_encoding) {
                        event
                    } else {
                        event.with_reason(&format!("content-encoding {}", content_encoding))
                    };
                    self.audit(event);
                }
            }
        }

        Action::Continue
    }

    fn on_http_response_body(&mut self, body_size: usize, end_of_stream: bool) -> Action {
        if self.body.is_none() {
            return Action::Continue;
        }

        debug!(
            "[context_id={}] Received body chunk: {} bytes, end_of_stream: {}",
            self.context_id, body_size, end_of_stream
        );

        let chunk = self
            .get_http_response_body(0, body_size)
            .unwrap_or_default();

        let Some(body) = self.body.as_mut() else {
            return Action::Continue;
        };

        let result = body.on_body_chunk(&chunk, end_of_stream).map(|out| {
            let rewriter = body.rewriter();
            (out, rewriter.bytes_in(), rewriter.bytes_out())
        });

        match result {
            Ok((out, bytes_in, bytes_out)) => {
                self.set_http_response_body(0, body_size, &out);
                if end_of_stream {
                    self.finished = true;
                    info!(
                        "[context_id={}] Stylesheet rewritten: {} bytes in, {} bytes out",
                        self.context_id, bytes_in, bytes_out
                    );
                    self.audit(telemetry::audit_stream_rewritten(bytes_in, bytes_out));
                }
            }
            Err(e) => {
                warn!(
                    "[context_id={}] Rewrite failed, passing chunk through: {}",
                    self.context_id, e
                );
                self.body = None;
                self.audit(telemetry::audit_failed(&e.to_string()));
            }
        }

        Action::Continue
    }

    fn on_log(&mut self) {
        if self.finished {
            debug!("[context_id={}] Request processing complete", self.context_id);
            return;
        }

        if let Some(mut body) = self.body.take() {
            let discarded = body.abort();
            warn!(
                "[context_id={}] Stream ended before end of body, {} bytes discarded",
                self.context_id, discarded
            );
            self.audit(telemetry::audit_stream_aborted(discarded));
        }
    }
}

// Register the filter with proxy-wasm runtime
proxy_wasm::main! {{
    proxy_wasm::set_log_level(LogLevel::Debug);
    proxy_wasm::set_root_context(|_| -> Box<dyn RootContext> {
        Box::new(RewriteRootContext::new())
    });
}}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(content_type: &str) -> ResponseHeaders<'_> {
        ResponseHeaders {
            content_type,
            content_encoding: "",
            end_of_stream: false,
        }
    }

    fn origin() -> Url {
        Url::parse("https://site.test/css/main.css").unwrap()
    }

    #[test]
    fn test_proxied_stylesheet_is_streamed() {
        let rewriter = CssRewriter::new(FilterConfig::default());
        let ctx = RewriteContext::from_proxied_path(
            "/proxy/https://site.test/css/main.css",
            "/proxy/",
        )
        .unwrap();

        let handling = response_handling(&rewriter, Some(ctx.url()), &headers("text/css"));
        let ResponseHandling::Stream(mut body) = handling else {
            panic!("Expected stylesheet to be streamed");
        };

        let mut out = body.on_body_chunk(b"a { b: url(/img/", false).unwrap();
        out.extend(body.on_body_chunk(b"x.png) }", true).unwrap());
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "a { b: url(/proxy/https://site.test/img/x.png) }"
        );
    }

    #[test]
    fn test_custom_prefix_stream() {
        let rewriter = CssRewriter::new(FilterConfig::with_prefix("/p/"));
        let handling = response_handling(&rewriter, Some(&origin()), &headers("text/css"));
        let ResponseHandling::Stream(mut body) = handling else {
            panic!("Expected stylesheet to be streamed");
        };

        let out = body.on_body_chunk(b"a{b:url(//cdn.test/x.png)}", true).unwrap();
        assert_eq!(out, b"a{b:url(/p/https://cdn.test/x.png)}");
    }

    #[test]
    fn test_unproxied_request_passes_through() {
        let rewriter = CssRewriter::new(FilterConfig::default());
        let handling = response_handling(&rewriter, None, &headers("text/css"));
        assert!(matches!(handling, ResponseHandling::PassThrough));
    }

    #[test]
    fn test_html_passes_through_in_filter() {
        let rewriter = CssRewriter::new(FilterConfig::default());
        let handling = response_handling(&rewriter, Some(&origin()), &headers("text/html"));
        assert!(matches!(handling, ResponseHandling::PassThrough));
    }

    #[test]
    fn test_compressed_stylesheet_passes_through() {
        let rewriter = CssRewriter::new(FilterConfig::default());
        for encoding in ["gzip", "br", "deflate", "identity, gzip"] {
            let handling = response_handling(
                &rewriter,
                Some(&origin()),
                &ResponseHeaders {
                    content_encoding: encoding,
                    ..headers("text/css")
                },
            );
            assert!(
                matches!(handling, ResponseHandling::PassThrough),
                "encoding {:?}",
                encoding
            );
        }

        let handling = response_handling(
            &rewriter,
            Some(&origin()),
            &ResponseHeaders {
                content_encoding: "identity",
                ..headers("text/css")
            },
        );
        assert!(matches!(handling, ResponseHandling::Stream(_)));
    }

    #[test]
    fn test_headers_only_response_not_streamed() {
        let rewriter = CssRewriter::new(FilterConfig::default());
        let handling = response_handling(
            &rewriter,
            Some(&origin()),
            &ResponseHeaders {
                end_of_stream: true,
                ..headers("text/css")
            },
        );
        assert!(matches!(handling, ResponseHandling::PassThrough));
    }
}
