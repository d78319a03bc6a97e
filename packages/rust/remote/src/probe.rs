//! Header-only probes of remote files.
//!
//! A probe issues one `HEAD` request and reads the MIME type and file name
//! from the response headers. Results, including failures, are memoized per
//! URL for the lifetime of a [`ProbeCache`], and concurrent probes of the same
//! URL share a single request.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use attachport_shared::RemoteFileInfo;
use regex::Regex;
use reqwest::Client;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, instrument, trace};
use url::Url;

use crate::naming::extension_of;

/// `filename*=UTF-8''encoded%20name` (RFC 5987 extended parameter).
static EXTENDED_FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)filename\*\s*=\s*([^']*)'[^']*'([^;\s]+)"#).expect("valid regex")
});

/// `filename="name"` or `filename=name`.
static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)filename\s*=\s*(?:"([^"]*)"|([^;\s]+))"#).expect("valid regex")
});

type ProbeSlot = Arc<OnceCell<Option<RemoteFileInfo>>>;

// ---------------------------------------------------------------------------
// ProbeCache
// ---------------------------------------------------------------------------

/// Per-run memo of probe results keyed by exact URL string.
#[derive(Debug, Default)]
pub struct ProbeCache {
    slots: Mutex<HashMap<String, ProbeSlot>>,
}

impl ProbeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot for `url`, created empty on first use.
    async fn slot(&self, url: &str) -> ProbeSlot {
        let mut slots = self.slots.lock().await;
        slots.entry(url.to_string()).or_default().clone()
    }

    /// A settled result for `url`, if one has been recorded.
    pub async fn get(&self, url: &str) -> Option<Option<RemoteFileInfo>> {
        let slots = self.slots.lock().await;
        slots.get(url).and_then(|slot| slot.get().cloned())
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    /// Forget every memoized result.
    pub async fn clear(&self) {
        self.slots.lock().await.clear();
    }
}

// ---------------------------------------------------------------------------
// Prober
// ---------------------------------------------------------------------------

/// Issues memoized `HEAD` probes. Clones share the same cache.
#[derive(Debug, Clone)]
pub struct Prober {
    client: Client,
    timeout: Duration,
    cache: Arc<ProbeCache>,
}

impl Prober {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self::with_cache(client, timeout, Arc::new(ProbeCache::new()))
    }

    pub fn with_cache(client: Client, timeout: Duration, cache: Arc<ProbeCache>) -> Self {
        Self {
            client,
            timeout,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<ProbeCache> {
        &self.cache
    }

    /// Probe `url`, returning `None` if no response could be obtained.
    ///
    /// Any HTTP response counts, whatever its status: servers that refuse
    /// `HEAD` still tend to describe the resource in their headers, and the
    /// download step reports the real status.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn probe(&self, url: &str) -> Option<RemoteFileInfo> {
        let slot = self.cache.slot(url).await;
        slot.get_or_init(|| self.probe_uncached(url)).await.clone()
    }

    async fn probe_uncached(&self, url: &str) -> Option<RemoteFileInfo> {
        let response = match self.client.head(url).timeout(self.timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, timeout = e.is_timeout(), "probe failed");
                return None;
            }
        };

        trace!(status = %response.status(), "probe response");
        Some(file_info_from_headers(url, response.headers()))
    }
}

// ---------------------------------------------------------------------------
// Header interpretation
// ---------------------------------------------------------------------------

/// Build [`RemoteFileInfo`] from probe response headers.
///
/// The file name comes from `Content-Disposition` when present, else from the
/// last non-empty path segment of `url`. The extension is the file name's own
/// suffix when that looks like an extension, else the MIME subtype.
pub fn file_info_from_headers(url: &str, headers: &HeaderMap) -> RemoteFileInfo {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let (mime_type, subtype) = match content_type {
        Some(raw) => match raw.parse::<mime::Mime>() {
            Ok(m) => (
                Some(m.essence_str().to_string()),
                Some(m.subtype().as_str().to_ascii_lowercase()),
            ),
            Err(_) => {
                let essence = raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
                let subtype = essence.split_once('/').map(|(_, s)| s.to_string());
                (Some(essence).filter(|e| !e.is_empty()), subtype)
            }
        },
        None => (None, None),
    };

    let file_name = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(disposition_file_name)
        .or_else(|| url_file_name(url));

    let extension = file_name
        .as_deref()
        .and_then(extension_of)
        .map(str::to_string)
        .or_else(|| subtype.filter(|s| !s.is_empty()));

    RemoteFileInfo {
        mime_type,
        file_name,
        extension,
    }
}

/// File name from a `Content-Disposition` value, preferring `filename*`.
fn disposition_file_name(value: &str) -> Option<String> {
    if let Some(caps) = EXTENDED_FILENAME_RE.captures(value) {
        let encoded = caps.get(2).map_or("", |m| m.as_str());
        let decoded = urlencoding::decode(encoded)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| encoded.to_string());
        if let Some(name) = non_empty(&decoded) {
            return Some(name);
        }
    }

    let caps = FILENAME_RE.captures(value)?;
    let raw = caps.get(1).or_else(|| caps.get(2))?.as_str();
    non_empty(raw)
}

/// Last non-empty path segment of `url`.
fn url_file_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    non_empty(segment)
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
