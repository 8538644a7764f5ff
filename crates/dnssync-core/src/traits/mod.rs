//! Core traits for the webhook adapter
//!
//! - [`RewriteApi`]: list, create and delete vendor rewrite rules

pub mod rewrite_api;

pub use rewrite_api::{NewRewriteRule, RewriteApi, RewriteRule};
