//! In-memory collaborators for pipeline tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use attachport_remote::UploadDir;
use attachport_shared::{
    AttachmentId, AttachmentMeta, AttachmentRegistrar, AttachportError, ContentKind,
    ContentStore, ContentUnit, IdRange, ImportConfig, ImportTracker, Result, StaticUploadTypes,
    UnitId, UploadTypeRegistry,
};
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Mutex;

use crate::Importer;

pub(crate) fn post(id: i64, body: &str, excerpt: &str) -> ContentUnit {
    ContentUnit {
        id: UnitId(id),
        kind: ContentKind::Post,
        body: body.to_string(),
        excerpt: excerpt.to_string(),
        published_at: Utc.with_ymd_and_hms(2010, 5, 17, 9, 0, 0).unwrap(),
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    units: Mutex<BTreeMap<UnitId, ContentUnit>>,
    updates: AtomicU64,
    types: StaticUploadTypes,
}

impl MemoryStore {
    pub async fn insert(&self, unit: ContentUnit) {
        self.units.lock().await.insert(unit.id, unit);
    }

    pub async fn get(&self, id: UnitId) -> Option<ContentUnit> {
        self.units.lock().await.get(&id).cloned()
    }

    pub async fn update_count(&self) -> u64 {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn load(&self, id: UnitId) -> Result<Option<ContentUnit>> {
        Ok(self.get(id).await)
    }

    async fn update(&self, id: UnitId, body: &str, excerpt: &str) -> Result<()> {
        let mut units = self.units.lock().await;
        let unit = units
            .get_mut(&id)
            .ok_or_else(|| AttachportError::Storage(format!("no unit {id}")))?;
        unit.body = body.to_string();
        unit.excerpt = excerpt.to_string();
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_units(&self, kind: &ContentKind, range: IdRange) -> Result<Vec<UnitId>> {
        Ok(self
            .units
            .lock()
            .await
            .values()
            .filter(|u| &u.kind == kind && range.contains(u.id))
            .map(|u| u.id)
            .collect())
    }

    fn upload_types(&self) -> &dyn UploadTypeRegistry {
        &self.types
    }
}

#[derive(Default)]
pub(crate) struct MemoryRegistrar {
    next_id: AtomicI64,
    registered: Mutex<Vec<(AttachmentMeta, UnitId)>>,
    derived: Mutex<Vec<AttachmentId>>,
    fail_register: AtomicBool,
    fail_derived: AtomicBool,
}

impl MemoryRegistrar {
    pub fn fail_registrations(&self) {
        self.fail_register.store(true, Ordering::SeqCst);
    }

    pub fn fail_derived_metadata(&self) {
        self.fail_derived.store(true, Ordering::SeqCst);
    }

    pub async fn registered(&self) -> Vec<(AttachmentMeta, UnitId)> {
        self.registered.lock().await.clone()
    }

    pub async fn derived(&self) -> Vec<AttachmentId> {
        self.derived.lock().await.clone()
    }
}

#[async_trait]
impl AttachmentRegistrar for MemoryRegistrar {
    async fn register(&self, meta: &AttachmentMeta, owner: UnitId) -> Result<AttachmentId> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(AttachportError::Storage("registrar unavailable".into()));
        }
        let id = AttachmentId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.registered.lock().await.push((meta.clone(), owner));
        Ok(id)
    }

    async fn generate_derived_metadata(&self, id: AttachmentId, _local_path: &Path) -> Result<()> {
        if self.fail_derived.load(Ordering::SeqCst) {
            return Err(AttachportError::Storage("metadata unavailable".into()));
        }
        self.derived.lock().await.push(id);
        Ok(())
    }

    async fn imported_count(&self) -> Result<u64> {
        Ok(self.registered.lock().await.len() as u64)
    }
}

#[derive(Default)]
pub(crate) struct MemoryTracker {
    processed: Mutex<BTreeMap<UnitId, DateTime<Utc>>>,
}

#[async_trait]
impl ImportTracker for MemoryTracker {
    async fn mark_processed(&self, id: UnitId, at: DateTime<Utc>) -> Result<()> {
        self.processed.lock().await.insert(id, at);
        Ok(())
    }

    async fn is_processed(&self, id: UnitId) -> Result<bool> {
        Ok(self.processed.lock().await.contains_key(&id))
    }

    async fn processed_count(&self) -> Result<u64> {
        Ok(self.processed.lock().await.len() as u64)
    }

    async fn reset_all(&self) -> Result<u64> {
        let mut processed = self.processed.lock().await;
        let removed = processed.len() as u64;
        processed.clear();
        Ok(removed)
    }
}

/// An importer wired to in-memory collaborators and a temporary upload dir.
pub(crate) struct Harness {
    pub importer: Arc<Importer>,
    pub store: Arc<MemoryStore>,
    pub registrar: Arc<MemoryRegistrar>,
    pub tracker: Arc<MemoryTracker>,
    uploads: tempfile::TempDir,
}

impl Harness {
    pub async fn new(domains: &[&str]) -> Self {
        let uploads = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        let registrar = Arc::new(MemoryRegistrar::default());
        let tracker = Arc::new(MemoryTracker::default());

        let config = ImportConfig::default().with_domains(domains.iter().copied());
        let importer = Importer::new(
            config,
            UploadDir::new(uploads.path(), "/uploads"),
            store.clone(),
            registrar.clone(),
            tracker.clone(),
        )
        .unwrap();

        Self {
            importer: Arc::new(importer),
            store,
            registrar,
            tracker,
            uploads,
        }
    }

    pub fn uploads_root(&self) -> &Path {
        self.uploads.path()
    }

    pub async fn probe_cache_is_empty(&self) -> bool {
        self.importer.probe_cache().is_empty().await
    }

    /// Every regular file under the upload directory.
    pub fn uploaded_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let mut stack = vec![self.uploads.path().to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        files
    }
}
