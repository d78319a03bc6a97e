//! Candidate asset discovery.
//!
//! Recognizes three shapes of reference in post markup:
//! - `<img src="…">`: any embedded image, except inline `data:` values
//! - `<a href="….pdf">`: links whose target ends in a configured extension
//! - `<a href="…/.a/…">`: links to legacy hosted assets, whatever their extension
//!
//! Attribute order, quoting style and tag case are tolerated, as is
//! whitespace around `=`. This is deliberately a pattern scan, not an HTML parse.

use std::collections::HashSet;

use attachport_shared::{AttachportError, ExtractConfig, Result};
use regex::{Captures, Regex};

/// Prefix of inline-encoded values that are never files.
const INLINE_DATA_PREFIX: &str = "data:";

/// Capture group names, in the order they are tried for each match.
const GROUPS: &[&str] = &["img_dq", "img_sq", "doc_dq", "doc_sq", "hid_dq", "hid_sq"];

/// Compiled candidate scanner for one extraction configuration.
#[derive(Debug, Clone)]
pub struct AssetExtractor {
    pattern: Regex,
}

impl AssetExtractor {
    /// Compile a scanner for the given extensions and asset marker.
    pub fn new(config: &ExtractConfig) -> Result<Self> {
        let mut branches = vec![
            r#"<img\s(?:[^>]*?\s)?src\s*=\s*(?:"(?P<img_dq>[^"]*)"|'(?P<img_sq>[^']*)')"#
                .to_string(),
        ];

        let extensions: Vec<String> = config
            .allowed_extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.'))
            .filter(|e| !e.is_empty())
            .map(regex::escape)
            .collect();
        if !extensions.is_empty() {
            let exts = extensions.join("|");
            branches.push(format!(
                r#"<a\s(?:[^>]*?\s)?href\s*=\s*(?:"(?P<doc_dq>[^"]+?\.(?:{exts}))"|'(?P<doc_sq>[^']+?\.(?:{exts}))')"#
            ));
        }

        if !config.asset_marker.is_empty() {
            let marker = regex::escape(&config.asset_marker);
            branches.push(format!(
                r#"<a\s(?:[^>]*?\s)?href\s*=\s*(?:"(?P<hid_dq>[^"]*{marker}[^"]+)"|'(?P<hid_sq>[^']*{marker}[^']+)')"#
            ));
        }

        let pattern = Regex::new(&format!("(?i){}", branches.join("|")))
            .map_err(|e| AttachportError::config(format!("invalid extraction pattern: {e}")))?;

        Ok(Self { pattern })
    }

    /// Return candidate URLs in `text`, de-duplicated by exact string, in
    /// order of first occurrence.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut candidates = Vec::new();

        for caps in self.pattern.captures_iter(text) {
            let Some(value) = candidate_value(&caps) else {
                continue;
            };
            if seen.insert(value) {
                candidates.push(value.to_string());
            }
        }

        tracing::trace!(count = candidates.len(), "extracted candidates");
        candidates
    }
}

impl Default for AssetExtractor {
    fn default() -> Self {
        // The default configuration only contains literal, escaped pieces.
        Self::new(&ExtractConfig::default()).expect("default extraction pattern compiles")
    }
}

/// Pick the populated group of a match and filter out non-file values.
fn candidate_value<'t>(caps: &Captures<'t>) -> Option<&'t str> {
    let (group, m) = GROUPS
        .iter()
        .find_map(|name| caps.name(name).map(|m| (*name, m)))?;

    let value = m.as_str().trim();
    if value.is_empty() {
        return None;
    }
    if group.starts_with("img") && is_inline_data(value) {
        return None;
    }
    Some(value)
}

fn is_inline_data(value: &str) -> bool {
    value
        .get(..INLINE_DATA_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(INLINE_DATA_PREFIX))
}

/// Merge per-field candidate lists, keeping the first occurrence of each URL.
pub fn merge_candidates(lists: &[Vec<String>]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut merged = Vec::new();
    for url in lists.iter().flatten() {
        if seen.insert(url.as_str()) {
            merged.push(url.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Vec<String> {
        AssetExtractor::default().extract(text)
    }

    #[test]
    fn finds_images_in_either_quote_style() {
        let html = r#"<p><img src="http://old.example/a.jpg"> and <img src='http://old.example/b.png' /></p>"#;
        assert_eq!(
            extract(html),
            vec!["http://old.example/a.jpg", "http://old.example/b.png"]
        );
    }

    #[test]
    fn tolerates_attribute_order_and_case() {
        let html = r#"
            <img class="left" alt="a / b" src="http://old.example/one.jpg">
            <IMG SRC = "http://old.example/two.jpg" width="10">
            <img
                data-src="http://lazy.example/ignored.jpg"
                src="http://old.example/three.jpg">
        "#;
        assert_eq!(
            extract(html),
            vec![
                "http://old.example/one.jpg",
                "http://old.example/two.jpg",
                "http://old.example/three.jpg",
            ]
        );
    }

    #[test]
    fn skips_inline_data_images() {
        let html = r#"<img src="data:image/png;base64,iVBORw0KGgo="><img src="DATA:image/gif;base64,R0lG">"#;
        assert!(extract(html).is_empty());
    }

    #[test]
    fn finds_document_links_by_extension() {
        let html = r#"
            <a href="http://old.example/files/report.pdf">Report</a>
            <a title="x" href='http://old.example/files/Deck.PPTX'>Deck</a>
            <a href="http://old.example/about.html">About</a>
            <a href="http://old.example/song.mp3?dl=1">Song</a>
        "#;
        assert_eq!(
            extract(html),
            vec![
                "http://old.example/files/report.pdf",
                "http://old.example/files/Deck.PPTX",
            ]
        );
    }

    #[test]
    fn finds_hidden_assets_without_extension() {
        let html = r#"<a class="asset-img-link" href="http://old.example/.a/6a00d8341c-pi"><img src="http://old.example/.a/6a00d8341c-320wi"></a>"#;
        assert_eq!(
            extract(html),
            vec![
                "http://old.example/.a/6a00d8341c-pi",
                "http://old.example/.a/6a00d8341c-320wi",
            ]
        );
    }

    #[test]
    fn ignores_tags_that_only_start_like_a_or_img() {
        let html = r#"<abbr href="http://x/report.pdf">r</abbr><area href="http://x/map.pdf"><imgx src="http://x/a.jpg">"#;
        assert!(extract(html).is_empty());
    }

    #[test]
    fn duplicates_collapse_across_quoting() {
        let html = r#"
            <img src="http://old.example/pic.jpg">
            <img src='http://old.example/pic.jpg'>
            <a href="http://old.example/pic.jpg"><img alt="" src="http://old.example/pic.jpg"></a>
        "#;
        assert_eq!(extract(html), vec!["http://old.example/pic.jpg"]);
    }

    #[test]
    fn extraction_is_idempotent() {
        let html = r#"<img src="http://a/1.jpg"><a href="http://a/2.pdf">x</a><a href="http://a/.a/3">y</a>"#;
        let extractor = AssetExtractor::default();
        assert_eq!(extractor.extract(html), extractor.extract(html));
    }

    #[test]
    fn empty_values_are_skipped() {
        assert!(extract(r#"<img src=""><img src="   ">"#).is_empty());
    }

    #[test]
    fn custom_extensions_and_marker() {
        let config = ExtractConfig {
            allowed_extensions: vec![".zip".into()],
            asset_marker: "/assets/".into(),
        };
        let extractor = AssetExtractor::new(&config).expect("compile");
        let html = r#"<a href="http://x/a.zip">z</a><a href="http://x/b.pdf">p</a><a href="http://x/assets/c">c</a><a href="http://x/.a/d">d</a>"#;
        assert_eq!(extractor.extract(html), vec!["http://x/a.zip", "http://x/assets/c"]);
    }

    #[test]
    fn no_extensions_and_no_marker_leaves_only_images() {
        let config = ExtractConfig {
            allowed_extensions: vec![],
            asset_marker: String::new(),
        };
        let extractor = AssetExtractor::new(&config).expect("compile");
        let html = r#"<a href="http://x/a.pdf">p</a><img src="http://x/i.png">"#;
        assert_eq!(extractor.extract(html), vec!["http://x/i.png"]);
    }

    #[test]
    fn merge_keeps_first_occurrence() {
        let body = vec!["http://a/1.jpg".to_string(), "http://a/2.jpg".to_string()];
        let excerpt = vec!["http://a/2.jpg".to_string(), "http://a/3.jpg".to_string()];
        assert_eq!(
            merge_candidates(&[body, excerpt]),
            vec!["http://a/1.jpg", "http://a/2.jpg", "http://a/3.jpg"]
        );
    }
}
