//! Per-unit import pipeline: extract → check → fetch → register → rewrite → persist.

use std::sync::Arc;

use attachport_markup::{AssetExtractor, merge_candidates, rewrite_fields};
use attachport_remote::{
    AllowList, EligibilityChecker, Fetcher, ProbeCache, Prober, UploadDir, build_client,
};
use attachport_shared::{
    AttachmentMeta, AttachmentRegistrar, AttachportError, ContentKind, ContentStore,
    ContentUnit, EligibilityDecision, FetchFailure, FetchOutcome, ImportConfig, ImportOutcome,
    ImportReport, ImportTracker, Result, UnitId, UploadTypeRegistry,
};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

/// Imports the remote assets referenced by content units.
///
/// One `Importer` is one run: its probe cache lives as long as it does, and
/// is shared by every unit it imports (including concurrently, behind an
/// `Arc`).
pub struct Importer {
    config: ImportConfig,
    extractor: AssetExtractor,
    fetcher: Fetcher,
    store: Arc<dyn ContentStore>,
    registrar: Arc<dyn AttachmentRegistrar>,
    tracker: Arc<dyn ImportTracker>,
}

impl Importer {
    pub fn new(
        config: ImportConfig,
        uploads: UploadDir,
        store: Arc<dyn ContentStore>,
        registrar: Arc<dyn AttachmentRegistrar>,
        tracker: Arc<dyn ImportTracker>,
    ) -> Result<Self> {
        let client = build_client(&config)?;
        let prober = Prober::new(client.clone(), config.probe_timeout);
        let checker = EligibilityChecker::new(prober, AllowList::new(&config.allow_list));
        let fetcher = Fetcher::new(client, checker, uploads, config.download_timeout);
        let extractor = AssetExtractor::new(&config.extract)?;

        Ok(Self {
            config,
            extractor,
            fetcher,
            store,
            registrar,
            tracker,
        })
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn tracker(&self) -> &Arc<dyn ImportTracker> {
        &self.tracker
    }

    pub fn probe_cache(&self) -> &Arc<ProbeCache> {
        self.fetcher.checker().prober().cache()
    }

    /// Forget every memoized probe result.
    pub async fn reset_cache(&self) {
        self.probe_cache().clear().await;
    }

    /// Import every eligible asset referenced by unit `id` and rewrite its
    /// body and excerpt to point at the local copies.
    ///
    /// Per-candidate problems are recorded in the report. Only a unit that
    /// cannot be loaded, is not a post, or cannot be written back is an `Err`.
    #[instrument(skip(self), fields(unit = %id))]
    pub async fn import_unit(&self, id: UnitId) -> Result<ImportReport> {
        let unit = self
            .store
            .load(id)
            .await?
            .ok_or_else(|| AttachportError::load(format!("unable to load content unit {id}")))?;

        if unit.kind != ContentKind::Post {
            return Err(AttachportError::load(format!(
                "content unit {id} is of kind \"{}\", not \"{}\"",
                unit.kind,
                ContentKind::Post
            )));
        }

        let candidates = merge_candidates(&[
            self.extractor.extract(&unit.body),
            self.extractor.extract(&unit.excerpt),
        ]);
        debug!(candidates = candidates.len(), "extracted candidates");

        let registry = self.store.upload_types();
        let mut report = ImportReport::new(id);
        for url in candidates {
            let outcome = self.import_candidate(&url, &unit, registry).await;
            report.record(url, outcome);
        }

        let replacements = report.replacements();
        let ContentUnit {
            mut body,
            mut excerpt,
            ..
        } = unit;
        rewrite_fields(&mut [&mut body, &mut excerpt], &replacements);

        self.store.update(id, &body, &excerpt).await?;
        self.tracker.mark_processed(id, Utc::now()).await?;

        info!(
            candidates = report.len(),
            imported = report.imported_count(),
            ineligible = report.ineligible_count(),
            failed = report.failed_count(),
            "content unit processed"
        );
        Ok(report)
    }

    /// Resolve one candidate to exactly one outcome.
    async fn import_candidate(
        &self,
        url: &str,
        unit: &ContentUnit,
        registry: &dyn UploadTypeRegistry,
    ) -> ImportOutcome {
        let checker = self.fetcher.checker();
        if let EligibilityDecision::Ineligible(reason) = checker.check(url, registry).await {
            debug!(%url, %reason, "skipping candidate");
            return ImportOutcome::Ineligible(reason);
        }

        let (local_path, local_url) = match self.fetcher.fetch(url, unit.published_at, registry).await {
            FetchOutcome::Fetched {
                local_path,
                local_url,
            } => (local_path, local_url),
            FetchOutcome::Failed(failure) => {
                warn!(%url, %failure, "fetch failed");
                return ImportOutcome::Failed(failure);
            }
        };

        let title = local_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = match checker.prober().probe(url).await.and_then(|i| i.mime_type) {
            Some(mime) => Some(mime),
            None => local_path
                .file_name()
                .and_then(|n| registry.check(&n.to_string_lossy()))
                .map(|t| t.mime_type),
        };

        let meta = AttachmentMeta {
            local_url: local_url.clone(),
            remote_url: url.to_string(),
            local_path: local_path.clone(),
            mime_type,
            title,
        };

        let attachment_id = match self.registrar.register(&meta, unit.id).await {
            Ok(id) => id,
            Err(e) => {
                warn!(%url, error = %e, "attachment registration failed");
                self.fetcher.uploads().remove(&local_path).await;
                return ImportOutcome::Failed(FetchFailure::Registration {
                    message: e.to_string(),
                });
            }
        };

        if let Err(e) = self
            .registrar
            .generate_derived_metadata(attachment_id, &local_path)
            .await
        {
            warn!(%url, attachment = %attachment_id, error = %e, "derived metadata failed");
        }

        debug!(%url, %local_url, attachment = %attachment_id, "imported");
        ImportOutcome::Imported {
            local_url,
            local_path,
            attachment_id,
        }
    }
}
