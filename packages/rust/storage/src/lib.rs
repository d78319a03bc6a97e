//! libSQL storage for content units, attachments, and import markers.
//!
//! [`Storage`] is the reference implementation of the importer's collaborator
//! traits ([`ContentStore`](attachport_shared::ContentStore),
//! [`AttachmentRegistrar`](attachport_shared::AttachmentRegistrar),
//! [`ImportTracker`](attachport_shared::ImportTracker)) for running imports
//! from the command line against a local database.
//!
//! **Access rules:**
//! - imports and seeding: read-write via [`Storage::open`]
//! - reporting: read-only via [`Storage::open_readonly`]

mod collab;
mod migrations;

use std::path::Path;

use attachport_shared::{
    AttachportError, ContentKind, ContentUnit, Result, StaticUploadTypes, UnitId,
};
use chrono::Utc;
use libsql::{Connection, Database, params};
use serde::Serialize;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    upload_types: StaticUploadTypes,
}

/// Row counts describing how far an import has progressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportProgress {
    /// Content units of kind `post`.
    pub posts: u64,
    /// Posts with an import marker.
    pub processed: u64,
    /// Attachments registered by imports.
    pub attachments: u64,
}

impl ImportProgress {
    pub fn pending(&self) -> u64 {
        self.posts.saturating_sub(self.processed)
    }
}

/// An attachment row as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentRecord {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub local_url: String,
    pub remote_url: String,
    pub local_path: String,
    pub mime_type: Option<String>,
    pub metadata_json: Option<String>,
}

pub(crate) fn db_err(e: libsql::Error) -> AttachportError {
    AttachportError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AttachportError::io(parent, e))?;
        }

        let storage = Self::connect(path, false).await?;
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` for reporting only.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AttachportError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }
        Self::connect(path, true).await
    }

    async fn connect(path: &Path, readonly: bool) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly,
            upload_types: StaticUploadTypes::new(),
        })
    }

    /// Replace the upload types this store accepts.
    pub fn with_upload_types(mut self, upload_types: StaticUploadTypes) -> Self {
        self.upload_types = upload_types;
        self
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        AttachportError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    async fn schema_version(&self) -> u32 {
        let Ok(mut rows) = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await
        else {
            return 0;
        };

        match rows.next().await {
            Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
            _ => 0,
        }
    }

    pub(crate) fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(AttachportError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    // -----------------------------------------------------------------------
    // Content units
    // -----------------------------------------------------------------------

    /// Insert or replace a content unit.
    pub async fn insert_unit(&self, unit: &ContentUnit) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO content_units (id, kind, body, excerpt, published_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    kind = excluded.kind,
                    body = excluded.body,
                    excerpt = excluded.excerpt,
                    published_at = excluded.published_at",
                params![
                    unit.id.0,
                    unit.kind.as_str(),
                    unit.body.as_str(),
                    unit.excerpt.as_str(),
                    unit.published_at.to_rfc3339()
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Load units from a JSON array of [`ContentUnit`] objects.
    /// Returns the number of units written.
    pub async fn import_units_json(&self, json: &str) -> Result<usize> {
        let units: Vec<ContentUnit> = serde_json::from_str(json)
            .map_err(|e| AttachportError::parse(format!("invalid seed file: {e}")))?;

        for unit in &units {
            self.insert_unit(unit).await?;
        }
        tracing::info!(count = units.len(), "seeded content units");
        Ok(units.len())
    }

    pub async fn get_unit(&self, id: UnitId) -> Result<Option<ContentUnit>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, kind, body, excerpt, published_at FROM content_units WHERE id = ?1",
                params![id.0],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_unit(&row)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn write_fields(&self, id: UnitId, body: &str, excerpt: &str) -> Result<()> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute(
                "UPDATE content_units SET body = ?2, excerpt = ?3, modified_at = ?4 WHERE id = ?1",
                params![id.0, body, excerpt, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(db_err)?;

        if changed == 0 {
            return Err(AttachportError::Storage(format!(
                "content unit {id} does not exist"
            )));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Attachments
    // -----------------------------------------------------------------------

    /// Attachments owned by a unit, oldest first.
    pub async fn list_attachments(&self, owner: UnitId) -> Result<Vec<AttachmentRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, owner_id, title, local_url, remote_url, local_path, mime_type, metadata_json
                 FROM attachments WHERE owner_id = ?1 ORDER BY id",
                params![owner.0],
            )
            .await
            .map_err(db_err)?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            records.push(AttachmentRecord {
                id: row.get::<i64>(0).map_err(db_err)?,
                owner_id: row.get::<i64>(1).map_err(db_err)?,
                title: row.get::<String>(2).map_err(db_err)?,
                local_url: row.get::<String>(3).map_err(db_err)?,
                remote_url: row.get::<String>(4).map_err(db_err)?,
                local_path: row.get::<String>(5).map_err(db_err)?,
                mime_type: row.get::<String>(6).ok(),
                metadata_json: row.get::<String>(7).ok(),
            });
        }
        Ok(records)
    }

    // -----------------------------------------------------------------------
    // Reporting
    // -----------------------------------------------------------------------

    pub async fn progress(&self) -> Result<ImportProgress> {
        let posts = self
            .count(
                "SELECT COUNT(*) FROM content_units WHERE kind = ?1",
                ContentKind::Post.as_str(),
            )
            .await?;
        let processed = self
            .count(
                "SELECT COUNT(*) FROM import_markers m
                 JOIN content_units u ON u.id = m.unit_id
                 WHERE u.kind = ?1",
                ContentKind::Post.as_str(),
            )
            .await?;
        let attachments = self.count_all("SELECT COUNT(*) FROM attachments").await?;

        Ok(ImportProgress {
            posts,
            processed,
            attachments,
        })
    }

    async fn count(&self, sql: &str, arg: &str) -> Result<u64> {
        let mut rows = self.conn.query(sql, params![arg]).await.map_err(db_err)?;
        first_count(&mut rows).await
    }

    pub(crate) async fn count_all(&self, sql: &str) -> Result<u64> {
        let mut rows = self.conn.query(sql, params![]).await.map_err(db_err)?;
        first_count(&mut rows).await
    }
}

async fn first_count(rows: &mut libsql::Rows) -> Result<u64> {
    match rows.next().await.map_err(db_err)? {
        Some(row) => Ok(row.get::<i64>(0).map_err(db_err)?.max(0) as u64),
        None => Ok(0),
    }
}

fn row_to_unit(row: &libsql::Row) -> Result<ContentUnit> {
    let published: String = row.get(4).map_err(db_err)?;
    let published_at = chrono::DateTime::parse_from_rfc3339(&published)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AttachportError::Storage(format!("invalid date: {e}")))?;

    Ok(ContentUnit {
        id: UnitId(row.get::<i64>(0).map_err(db_err)?),
        kind: ContentKind::from(row.get::<String>(1).map_err(db_err)?),
        body: row.get::<String>(2).map_err(db_err)?,
        excerpt: row.get::<String>(3).map_err(db_err)?,
        published_at,
    })
}
