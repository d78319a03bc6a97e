//! Core domain types for attachment imports.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of a content unit in the external content store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub i64);

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UnitId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// Identifier of a registered attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentId(pub i64);

impl std::fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive id range used to select units for a batch. Open on missing ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdRange {
    pub min: Option<UnitId>,
    pub max: Option<UnitId>,
}

impl IdRange {
    /// The unbounded range.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.min.is_none_or(|min| id >= min) && self.max.is_none_or(|max| id <= max)
    }
}

// ---------------------------------------------------------------------------
// ContentUnit
// ---------------------------------------------------------------------------

/// The kind of a content unit. Only [`ContentKind::Post`] is importable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentKind {
    Post,
    Page,
    Attachment,
    Other(String),
}

impl ContentKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Post => "post",
            Self::Page => "page",
            Self::Attachment => "attachment",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for ContentKind {
    fn from(s: &str) -> Self {
        match s {
            "post" => Self::Post,
            "page" => Self::Page,
            "attachment" => Self::Attachment,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for ContentKind {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<ContentKind> for String {
    fn from(kind: ContentKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A read snapshot of one piece of authored content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentUnit {
    /// Store identifier.
    pub id: UnitId,
    /// Content kind (post, page, ...).
    pub kind: ContentKind,
    /// Body HTML / text.
    #[serde(default)]
    pub body: String,
    /// Excerpt HTML / text.
    #[serde(default)]
    pub excerpt: String,
    /// Publication timestamp, used to partition uploads by year/month.
    pub published_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Remote metadata
// ---------------------------------------------------------------------------

/// What a header-only probe learned about a remote file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileInfo {
    /// MIME essence reported by the server (e.g. `image/jpeg`).
    pub mime_type: Option<String>,
    /// File name from `Content-Disposition`, or the last URL path segment.
    pub file_name: Option<String>,
    /// Extension from the file name, else guessed from the MIME subtype.
    pub extension: Option<String>,
}

/// A locally supported upload type, as resolved by an
/// [`UploadTypeRegistry`](crate::UploadTypeRegistry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadType {
    pub extension: String,
    pub mime_type: String,
}

// ---------------------------------------------------------------------------
// Decisions and outcomes
// ---------------------------------------------------------------------------

/// Why a candidate will not be imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IneligibleReason {
    #[error("unparsable URL")]
    UnparsableUrl,

    #[error("domain not allowed: {host}")]
    DomainNotAllowed { host: String },

    #[error("unable to fetch attachment details from server")]
    ProbeFailed,

    #[error("not a supported upload type: {file_name}")]
    UnsupportedType { file_name: String },
}

/// Result of the eligibility policy for one candidate URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EligibilityDecision {
    Eligible,
    Ineligible(IneligibleReason),
}

impl EligibilityDecision {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }
}

/// Why a download of an eligible candidate did not produce a local file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "failure", rename_all = "snake_case")]
pub enum FetchFailure {
    /// The eligibility re-check before download rejected the URL.
    #[error(transparent)]
    Ineligible(IneligibleReason),

    #[error("timeout when fetching attachment")]
    Timeout,

    #[error("network error: {message}")]
    Network { message: String },

    #[error("remote server returned error response {status} {reason}")]
    ServerError { status: u16, reason: String },

    #[error("zero size file downloaded")]
    EmptyFile,

    #[error("could not store attachment: {message}")]
    Storage { message: String },

    #[error("could not register attachment: {message}")]
    Registration { message: String },
}

/// Result of fetching one URL into local storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched { local_path: PathBuf, local_url: String },
    Failed(FetchFailure),
}

/// Everything a registrar needs to record an imported file.
#[derive(Debug, Clone)]
pub struct AttachmentMeta {
    /// URL the file is now served from.
    pub local_url: String,
    /// URL the file was imported from.
    pub remote_url: String,
    /// Absolute path of the stored file.
    pub local_path: PathBuf,
    /// MIME type reported by the remote server.
    pub mime_type: Option<String>,
    /// Display title (stored file name without extension).
    pub title: String,
}

/// Final per-candidate entry in an [`ImportReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ImportOutcome {
    Imported {
        local_url: String,
        local_path: PathBuf,
        attachment_id: AttachmentId,
    },
    Ineligible(IneligibleReason),
    Failed(FetchFailure),
}

impl ImportOutcome {
    pub fn is_imported(&self) -> bool {
        matches!(self, Self::Imported { .. })
    }
}

/// One literal substitution to apply to content text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub from: String,
    pub to: String,
}

impl Replacement {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ImportReport
// ---------------------------------------------------------------------------

/// Summary of one import run over one content unit, keyed by original URL.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub unit_id: UnitId,
    pub outcomes: BTreeMap<String, ImportOutcome>,
}

impl ImportReport {
    pub fn new(unit_id: UnitId) -> Self {
        Self {
            unit_id,
            outcomes: BTreeMap::new(),
        }
    }

    /// Record the outcome for `url`. The first outcome recorded for a URL wins;
    /// returns `false` if the URL already had one.
    pub fn record(&mut self, url: impl Into<String>, outcome: ImportOutcome) -> bool {
        match self.outcomes.entry(url.into()) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(outcome);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, url: &str) -> Option<&ImportOutcome> {
        self.outcomes.get(url)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Substitutions for every successfully imported URL.
    pub fn replacements(&self) -> Vec<Replacement> {
        self.outcomes
            .iter()
            .filter_map(|(url, outcome)| match outcome {
                ImportOutcome::Imported { local_url, .. } => {
                    Some(Replacement::new(url.as_str(), local_url.as_str()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn imported_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_imported()).count()
    }

    pub fn ineligible_count(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, ImportOutcome::Ineligible(_)))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, ImportOutcome::Failed(_)))
            .count()
    }
}
