//! Batch selection and concurrent import of many content units.

use std::sync::Arc;
use std::time::{Duration, Instant};

use attachport_shared::{
    AttachportError, ContentKind, ContentStore, IdRange, ImportReport, ImportTracker, Result,
    UnitId,
};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::importer::Importer;

/// A unit that could not be imported at all.
#[derive(Debug, Clone, Serialize)]
pub struct UnitFailure {
    pub unit_id: UnitId,
    pub message: String,
}

/// Result of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    /// Identifier of this run, for correlating log lines.
    pub run_id: Uuid,
    /// Reports of processed units, ascending by unit id.
    pub reports: Vec<ImportReport>,
    /// Units that failed to load or to be written back.
    pub failures: Vec<UnitFailure>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn units_processed(&self) -> usize {
        self.reports.len()
    }

    pub fn attachments_imported(&self) -> usize {
        self.reports.iter().map(ImportReport::imported_count).sum()
    }

    pub fn candidates_ineligible(&self) -> usize {
        self.reports.iter().map(ImportReport::ineligible_count).sum()
    }

    pub fn candidates_failed(&self) -> usize {
        self.reports.iter().map(ImportReport::failed_count).sum()
    }
}

/// Progress callbacks for a batch run. Called from worker tasks.
pub trait BatchProgress: Send + Sync {
    fn started(&self, total: usize);
    fn unit_done(&self, report: &ImportReport);
    fn unit_failed(&self, id: UnitId, error: &AttachportError);
    fn finished(&self, summary: &BatchSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl BatchProgress for SilentProgress {
    fn started(&self, _total: usize) {}
    fn unit_done(&self, _report: &ImportReport) {}
    fn unit_failed(&self, _id: UnitId, _error: &AttachportError) {}
    fn finished(&self, _summary: &BatchSummary) {}
}

/// Posts in `range` that have not been processed yet, ascending.
pub async fn pending_units(
    store: &dyn ContentStore,
    tracker: &dyn ImportTracker,
    range: IdRange,
) -> Result<Vec<UnitId>> {
    let mut pending = Vec::new();
    for id in store.list_units(&ContentKind::Post, range).await? {
        if range.contains(id) && !tracker.is_processed(id).await? {
            pending.push(id);
        }
    }
    pending.sort();
    pending.dedup();
    Ok(pending)
}

/// Import `ids` with at most `importer.config().concurrency` units in flight.
///
/// Unit-level errors are collected in the summary; the batch itself never fails.
#[instrument(skip_all, fields(run_id = tracing::field::Empty, units = ids.len()))]
pub async fn run_batch(
    importer: Arc<Importer>,
    ids: Vec<UnitId>,
    progress: Arc<dyn BatchProgress>,
) -> BatchSummary {
    let start = Instant::now();
    let run_id = Uuid::now_v7();
    tracing::Span::current().record("run_id", tracing::field::display(run_id));

    let concurrency = importer.config().concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    info!(concurrency, units = ids.len(), "starting batch");
    progress.started(ids.len());

    let mut handles = Vec::with_capacity(ids.len());
    for id in ids {
        let importer = importer.clone();
        let sem = semaphore.clone();
        let progress = progress.clone();

        let handle = tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return Err(AttachportError::validation("import semaphore closed"));
            };
            let result = importer.import_unit(id).await;
            match &result {
                Ok(report) => progress.unit_done(report),
                Err(e) => progress.unit_failed(id, e),
            }
            result
        });
        handles.push((id, handle));
    }

    let mut reports = Vec::new();
    let mut failures = Vec::new();
    for (id, handle) in handles {
        match handle.await {
            Ok(Ok(report)) => reports.push(report),
            Ok(Err(e)) => {
                warn!(unit = %id, error = %e, "unit import failed");
                failures.push(UnitFailure {
                    unit_id: id,
                    message: e.to_string(),
                });
            }
            Err(e) => {
                warn!(unit = %id, error = %e, "import task aborted");
                failures.push(UnitFailure {
                    unit_id: id,
                    message: e.to_string(),
                });
            }
        }
    }
    reports.sort_by_key(|r| r.unit_id);

    let summary = BatchSummary {
        run_id,
        reports,
        failures,
        elapsed: start.elapsed(),
    };

    info!(
        units = summary.units_processed(),
        failed_units = summary.failures.len(),
        attachments = summary.attachments_imported(),
        ineligible = summary.candidates_ineligible(),
        failed = summary.candidates_failed(),
        duration_ms = summary.elapsed.as_millis() as u64,
        "batch completed"
    );
    progress.finished(&summary);
    summary
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use attachport_shared::ImportOutcome;

    use super::*;
    use crate::testing::{Harness, post};

    #[derive(Default)]
    struct Recorder {
        events: StdMutex<Vec<String>>,
    }

    impl BatchProgress for Recorder {
        fn started(&self, total: usize) {
            self.events.lock().unwrap().push(format!("start {total}"));
        }
        fn unit_done(&self, report: &ImportReport) {
            self.events.lock().unwrap().push(format!("done {}", report.unit_id));
        }
        fn unit_failed(&self, id: UnitId, _error: &AttachportError) {
            self.events.lock().unwrap().push(format!("failed {id}"));
        }
        fn finished(&self, summary: &BatchSummary) {
            self.events
                .lock()
                .unwrap()
                .push(format!("finish {}", summary.units_processed()));
        }
    }

    #[tokio::test]
    async fn pending_skips_processed_and_non_posts() {
        let harness = Harness::new(&[]).await;
        for id in [5, 1, 3, 8] {
            harness.store.insert(post(id, "", "")).await;
        }
        let mut page = post(2, "", "");
        page.kind = ContentKind::Page;
        harness.store.insert(page).await;
        harness.tracker.mark_processed(UnitId(3), chrono::Utc::now()).await.unwrap();

        let all = pending_units(harness.store.as_ref(), harness.tracker.as_ref(), IdRange::all())
            .await
            .unwrap();
        assert_eq!(all, vec![UnitId(1), UnitId(5), UnitId(8)]);

        let bounded = pending_units(
            harness.store.as_ref(),
            harness.tracker.as_ref(),
            IdRange {
                min: Some(UnitId(2)),
                max: Some(UnitId(5)),
            },
        )
        .await
        .unwrap();
        assert_eq!(bounded, vec![UnitId(5)]);
    }

    #[tokio::test]
    async fn batch_imports_units_concurrently() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("HEAD"))
            .respond_with(
                wiremock::ResponseTemplate::new(200).insert_header("content-type", "image/jpeg"),
            )
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_bytes(b"jpg".to_vec()))
            .mount(&server)
            .await;

        let harness = Harness::new(&[]).await;
        for id in 1..=6 {
            let body = format!(r#"<img src="{}/u{id}.jpg">"#, server.uri());
            harness.store.insert(post(id, &body, "")).await;
        }

        let ids = pending_units(harness.store.as_ref(), harness.tracker.as_ref(), IdRange::all())
            .await
            .unwrap();
        let recorder = Arc::new(Recorder::default());
        let summary = run_batch(harness.importer.clone(), ids, recorder.clone()).await;

        assert_eq!(summary.units_processed(), 6);
        assert_eq!(summary.attachments_imported(), 6);
        assert!(summary.failures.is_empty());
        let order: Vec<UnitId> = summary.reports.iter().map(|r| r.unit_id).collect();
        assert_eq!(order, (1..=6).map(UnitId).collect::<Vec<_>>());

        for report in &summary.reports {
            let (_, outcome) = report.outcomes.iter().next().unwrap();
            assert!(matches!(outcome, ImportOutcome::Imported { .. }));
        }

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events.first().map(String::as_str), Some("start 6"));
        assert_eq!(events.last().map(String::as_str), Some("finish 6"));
        assert_eq!(events.iter().filter(|e| e.starts_with("done")).count(), 6);

        let remaining =
            pending_units(harness.store.as_ref(), harness.tracker.as_ref(), IdRange::all())
                .await
                .unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn load_failures_do_not_stop_the_batch() {
        let harness = Harness::new(&[]).await;
        harness.store.insert(post(1, "<p>text</p>", "")).await;

        let summary = run_batch(
            harness.importer.clone(),
            vec![UnitId(1), UnitId(404)],
            Arc::new(SilentProgress),
        )
        .await;

        assert_eq!(summary.units_processed(), 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].unit_id, UnitId(404));
        assert!(summary.failures[0].message.contains("unable to load content unit 404"));
    }

    #[tokio::test]
    async fn summary_serializes_for_reports() {
        let harness = Harness::new(&[]).await;
        harness.store.insert(post(1, "", "")).await;
        let summary =
            run_batch(harness.importer.clone(), vec![UnitId(1)], Arc::new(SilentProgress)).await;

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["reports"][0]["unit_id"], 1);
        assert!(json.get("elapsed").is_none());
    }
}
