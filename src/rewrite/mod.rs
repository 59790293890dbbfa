//! URL rewrite rule engine
//!
//! This module provides:
//! - The per-response rewrite context
//! - Three ordered insertion passes over generic text
//! - The CSS `url(...)` rule for isolated attribute/style values
//! - The URL delegate deciding what to fix and how

pub mod context;
pub mod css;
pub mod fixer;
pub mod rules;

pub use context::RewriteContext;
pub use css::fix_css;
pub use fixer::{PrefixUrlFixer, UrlFixer};
pub use rules::{rewrite, Pass};
