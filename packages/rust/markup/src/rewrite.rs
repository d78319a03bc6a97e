//! Literal URL substitution over content text.
//!
//! Keys are applied longest first so that a URL which is a strict prefix or
//! substring of another (`http://x/a` vs `http://x/ab`) never rewrites part
//! of the longer one.

use std::cmp::Reverse;

use attachport_shared::Replacement;

/// Sort replacements longest key first; equal lengths fall back to lexical order.
pub fn order_longest_first(replacements: &[Replacement]) -> Vec<&Replacement> {
    let mut ordered: Vec<&Replacement> = replacements
        .iter()
        .filter(|r| !r.from.is_empty())
        .collect();
    ordered.sort_by(|a, b| {
        (Reverse(a.from.len()), a.from.as_str()).cmp(&(Reverse(b.from.len()), b.from.as_str()))
    });
    ordered
}

/// Replace every occurrence of every key in `text`.
pub fn rewrite(text: &str, replacements: &[Replacement]) -> String {
    let mut result = text.to_string();
    for r in order_longest_first(replacements) {
        if result.contains(r.from.as_str()) {
            result = result.replace(r.from.as_str(), &r.to);
        }
    }
    result
}

/// Apply [`rewrite`] to several independent text fields in place.
/// Returns `true` if any field changed.
pub fn rewrite_fields(fields: &mut [&mut String], replacements: &[Replacement]) -> bool {
    let mut changed = false;
    for field in fields.iter_mut() {
        let rewritten = rewrite(field.as_str(), replacements);
        if rewritten != **field {
            **field = rewritten;
            changed = true;
        }
    }
    changed
}
