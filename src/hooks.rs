//! Response hooks
//!
//! HTML responses are rewritten through events from an HTML parser: every
//! `style` attribute and every inline `<style>` block is passed whole
//! through the CSS `url(...)` rule. Stylesheet responses get the chunked
//! stream rewriter instead. Everything else passes through.

use crate::config::FilterConfig;
use crate::content_types::ContentKind;
use crate::error::Result;
use crate::rewrite::{fix_css, PrefixUrlFixer, RewriteContext, UrlFixer};
use crate::streaming::BodyRewriter;
use std::rc::Rc;
use url::Url;

/// One attribute of a start tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// A start tag reported by the HTML parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag {
    pub name: String,
    pub attrs: Vec<Attribute>,
}

/// The text of an inline `<style>` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleBlock {
    pub source: String,
}

/// Event kinds a handler can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HtmlEventKind {
    StartTag,
    Style,
}

/// A mutable view of a parser event; changes are seen by the parser's consumer
pub enum HtmlEvent<'a> {
    StartTag(&'a mut StartTag),
    Style(&'a mut StyleBlock),
}

pub type HtmlEventHandler = Box<dyn FnMut(HtmlEvent<'_>) -> Result<()>>;

/// Anything that reports HTML start tags and style blocks
pub trait HtmlEventSource {
    fn subscribe(&mut self, kind: HtmlEventKind, handler: HtmlEventHandler);
}

/// What the response handler needs to know about one response
pub struct ResponseData<'a> {
    /// Original (un-proxied) URL of the response
    pub url: Url,
    pub content_type: String,
    /// Present when the body is being parsed as HTML
    pub html: Option<&'a mut dyn HtmlEventSource>,
}

/// How the body of a response will be rewritten
pub enum ResponseHandling {
    /// Rewritten through subscribed HTML event handlers
    Html,
    /// Rewritten chunk by chunk
    Stream(BodyRewriter),
    PassThrough,
}

/// Applies the CSS rules to HTML events and stylesheet responses
#[derive(Clone)]
pub struct CssRewriter {
    config: Rc<FilterConfig>,
    fixer: Rc<dyn UrlFixer>,
}

impl CssRewriter {
    pub fn new(config: FilterConfig) -> Self {
        Self::with_fixer(config, PrefixUrlFixer)
    }

    pub fn with_fixer(config: FilterConfig, fixer: impl UrlFixer + 'static) -> Self {
        Self {
            config: Rc::new(config),
            fixer: Rc::new(fixer),
        }
    }

    /// Rewrite `url(...)` tokens in a fully materialized CSS value
    pub fn fix_css(&self, css: &str, base: &Url) -> Result<String> {
        fix_css(css, base, &self.config, self.fixer.as_ref())
    }

    /// Rewrite every `style` attribute of a start tag.
    ///
    /// On error the failing attribute keeps its original value.
    pub fn on_start_tag(&self, tag: &mut StartTag, base: &Url) -> Result<()> {
        for attr in tag
            .attrs
            .iter_mut()
            .filter(|a| a.name.eq_ignore_ascii_case("style"))
        {
            attr.value = self.fix_css(&attr.value, base)?;
        }
        Ok(())
    }

    /// Rewrite the full text of an inline style block
    pub fn on_style_block(&self, block: &mut StyleBlock, base: &Url) -> Result<()> {
        block.source = self.fix_css(&block.source, base)?;
        Ok(())
    }

    /// Decide how a response is rewritten, subscribing to HTML events when
    /// the body is being parsed as HTML.
    pub fn handle_response(&self, response: ResponseData<'_>) -> ResponseHandling {
        if let Some(source) = response.html {
            let rewriter = self.clone();
            let base = response.url.clone();
            source.subscribe(
                HtmlEventKind::StartTag,
                Box::new(move |event: HtmlEvent<'_>| match event {
                    HtmlEvent::StartTag(tag) => rewriter.on_start_tag(tag, &base),
                    HtmlEvent::Style(_) => Ok(()),
                }),
            );

            let rewriter = self.clone();
            let base = response.url;
            source.subscribe(
                HtmlEventKind::Style,
                Box::new(move |event: HtmlEvent<'_>| match event {
                    HtmlEvent::Style(block) => rewriter.on_style_block(block, &base),
                    HtmlEvent::StartTag(_) => Ok(()),
                }),
            );

            return ResponseHandling::Html;
        }

        match ContentKind::classify(&response.content_type, &self.config) {
            ContentKind::Css => {
                let context = RewriteContext::new(response.url, &self.config.prefix);
                ResponseHandling::Stream(BodyRewriter::new(context))
            }
            ContentKind::Html | ContentKind::Other => ResponseHandling::PassThrough,
        }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }
}
