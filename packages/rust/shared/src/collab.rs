//! Narrow interfaces to the systems the importer collaborates with.
//!
//! The importer never talks to a database directly. Whatever hosts the
//! migrated content implements these traits; `attachport-storage` ships a
//! libSQL-backed implementation.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{AttachmentId, AttachmentMeta, ContentKind, ContentUnit, IdRange, UnitId, UploadType};

/// Decides which file names may be stored locally.
pub trait UploadTypeRegistry: Send + Sync {
    /// Resolve the extension and MIME type for `file_name`, or `None` if the
    /// host does not accept uploads of that type.
    fn check(&self, file_name: &str) -> Option<UploadType>;
}

/// Read/write access to the content being migrated.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Load a snapshot of one unit. `Ok(None)` when it does not exist.
    async fn load(&self, id: UnitId) -> Result<Option<ContentUnit>>;

    /// Write back body and excerpt in a single update.
    async fn update(&self, id: UnitId, body: &str, excerpt: &str) -> Result<()>;

    /// Ids of all units of `kind` inside `range`, ascending.
    async fn list_units(&self, kind: &ContentKind, range: IdRange) -> Result<Vec<UnitId>>;

    /// The upload types this store accepts.
    fn upload_types(&self) -> &dyn UploadTypeRegistry;
}

/// Records imported files as attachments owned by a content unit.
#[async_trait]
pub trait AttachmentRegistrar: Send + Sync {
    async fn register(&self, meta: &AttachmentMeta, owner: UnitId) -> Result<AttachmentId>;

    /// Compute and store derived metadata (size, checksum, ...) for a stored file.
    async fn generate_derived_metadata(&self, id: AttachmentId, local_path: &Path) -> Result<()>;

    /// Number of attachments registered by imports so far.
    async fn imported_count(&self) -> Result<u64>;
}

/// Remembers which units have already been processed.
#[async_trait]
pub trait ImportTracker: Send + Sync {
    async fn mark_processed(&self, id: UnitId, at: DateTime<Utc>) -> Result<()>;

    async fn is_processed(&self, id: UnitId) -> Result<bool>;

    async fn processed_count(&self) -> Result<u64>;

    /// Forget every processed marker. Returns how many were removed.
    async fn reset_all(&self) -> Result<u64>;
}
