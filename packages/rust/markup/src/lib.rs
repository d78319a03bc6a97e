//! Pattern-based scanning and rewriting of post markup.
//!
//! This crate provides:
//! - [`AssetExtractor`]: finds candidate asset URLs in HTML/text
//! - [`rewrite`] / [`rewrite_fields`]: longest-first literal URL substitution
//!
//! Both are pure functions of their input: no I/O, no shared state.

mod extract;
mod rewrite;

pub use extract::{AssetExtractor, merge_candidates};
pub use rewrite::{order_longest_first, rewrite, rewrite_fields};
