//! Collaborator trait implementations for [`Storage`].

use std::path::Path;

use async_trait::async_trait;
use attachport_shared::{
    AttachmentId, AttachmentMeta, AttachmentRegistrar, AttachportError, ContentKind, ContentStore,
    ContentUnit, IdRange, ImportTracker, Result, UnitId, UploadTypeRegistry,
};
use chrono::{DateTime, Utc};
use libsql::params;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{Storage, db_err};

/// Metadata derived from a stored file.
#[derive(Debug, Serialize)]
struct DerivedMetadata {
    file_size: u64,
    sha256: String,
    generated_at: DateTime<Utc>,
}

#[async_trait]
impl ContentStore for Storage {
    async fn load(&self, id: UnitId) -> Result<Option<ContentUnit>> {
        self.get_unit(id).await
    }

    async fn update(&self, id: UnitId, body: &str, excerpt: &str) -> Result<()> {
        self.write_fields(id, body, excerpt).await
    }

    async fn list_units(&self, kind: &ContentKind, range: IdRange) -> Result<Vec<UnitId>> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id FROM content_units
                 WHERE kind = ?1
                   AND (?2 IS NULL OR id >= ?2)
                   AND (?3 IS NULL OR id <= ?3)
                 ORDER BY id",
                params![kind.as_str(), range.min.map(|m| m.0), range.max.map(|m| m.0)],
            )
            .await
            .map_err(db_err)?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            ids.push(UnitId(row.get::<i64>(0).map_err(db_err)?));
        }
        Ok(ids)
    }

    fn upload_types(&self) -> &dyn UploadTypeRegistry {
        &self.upload_types
    }
}

#[async_trait]
impl AttachmentRegistrar for Storage {
    async fn register(&self, meta: &AttachmentMeta, owner: UnitId) -> Result<AttachmentId> {
        self.check_writable()?;
        let local_path = meta.local_path.to_string_lossy().into_owned();
        let mut rows = self
            .conn()
            .query(
                "INSERT INTO attachments
                    (owner_id, title, local_url, remote_url, local_path, mime_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 RETURNING id",
                params![
                    owner.0,
                    meta.title.as_str(),
                    meta.local_url.as_str(),
                    meta.remote_url.as_str(),
                    local_path,
                    meta.mime_type.as_deref(),
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(db_err)?;

        let row = rows
            .next()
            .await
            .map_err(db_err)?
            .ok_or_else(|| AttachportError::Storage("attachment insert returned no id".into()))?;
        let id = AttachmentId(row.get::<i64>(0).map_err(db_err)?);
        tracing::debug!(%id, owner = %owner, url = %meta.local_url, "registered attachment");
        Ok(id)
    }

    async fn generate_derived_metadata(&self, id: AttachmentId, local_path: &Path) -> Result<()> {
        self.check_writable()?;
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| AttachportError::io(local_path, e))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let metadata = DerivedMetadata {
            file_size: bytes.len() as u64,
            sha256: format!("{:x}", hasher.finalize()),
            generated_at: Utc::now(),
        };
        let json = serde_json::to_string(&metadata)
            .map_err(|e| AttachportError::Storage(format!("metadata encoding failed: {e}")))?;

        let changed = self
            .conn()
            .execute(
                "UPDATE attachments SET metadata_json = ?2 WHERE id = ?1",
                params![id.0, json],
            )
            .await
            .map_err(db_err)?;
        if changed == 0 {
            return Err(AttachportError::Storage(format!(
                "attachment {id} does not exist"
            )));
        }
        Ok(())
    }

    async fn imported_count(&self) -> Result<u64> {
        self.count_all("SELECT COUNT(*) FROM attachments").await
    }
}

#[async_trait]
impl ImportTracker for Storage {
    async fn mark_processed(&self, id: UnitId, at: DateTime<Utc>) -> Result<()> {
        self.check_writable()?;
        self.conn()
            .execute(
                "INSERT INTO import_markers (unit_id, processed_at) VALUES (?1, ?2)
                 ON CONFLICT(unit_id) DO UPDATE SET processed_at = excluded.processed_at",
                params![id.0, at.to_rfc3339()],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn is_processed(&self, id: UnitId) -> Result<bool> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM import_markers WHERE unit_id = ?1",
                params![id.0],
            )
            .await
            .map_err(db_err)?;
        Ok(rows.next().await.map_err(db_err)?.is_some())
    }

    async fn processed_count(&self) -> Result<u64> {
        self.count_all("SELECT COUNT(*) FROM import_markers").await
    }

    async fn reset_all(&self) -> Result<u64> {
        self.check_writable()?;
        let removed = self
            .conn()
            .execute("DELETE FROM import_markers", params![])
            .await
            .map_err(db_err)?;
        tracing::info!(removed, "cleared import markers");
        Ok(removed)
    }
}
