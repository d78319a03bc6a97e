//! Download of eligible remote files into the upload directory.

use std::time::Duration;

use attachport_shared::{EligibilityDecision, FetchFailure, FetchOutcome, UploadTypeRegistry};
use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::{debug, instrument, warn};

use crate::eligibility::EligibilityChecker;
use crate::naming::local_file_name;
use crate::uploads::UploadDir;

/// Downloads a URL after re-checking its eligibility.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    checker: EligibilityChecker,
    uploads: UploadDir,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(
        client: Client,
        checker: EligibilityChecker,
        uploads: UploadDir,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            checker,
            uploads,
            timeout,
        }
    }

    pub fn checker(&self) -> &EligibilityChecker {
        &self.checker
    }

    pub fn uploads(&self) -> &UploadDir {
        &self.uploads
    }

    /// Fetch `url` into the upload directory partition for `partition`.
    ///
    /// Every failure leaves the upload directory as it was.
    #[instrument(skip(self, registry), fields(url = %url))]
    pub async fn fetch(
        &self,
        url: &str,
        partition: DateTime<Utc>,
        registry: &dyn UploadTypeRegistry,
    ) -> FetchOutcome {
        if let EligibilityDecision::Ineligible(reason) = self.checker.check(url, registry).await {
            return FetchOutcome::Failed(FetchFailure::Ineligible(reason));
        }

        // Memoized by the eligibility check above.
        let info = self.checker.prober().probe(url).await.unwrap_or_default();
        let file_name = local_file_name(&info);

        let response = match self.client.get(url).timeout(self.timeout).send().await {
            Ok(response) => response,
            Err(e) => return FetchOutcome::Failed(transport_failure(&e)),
        };

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "download refused");
            return FetchOutcome::Failed(FetchFailure::ServerError {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return FetchOutcome::Failed(transport_failure(&e)),
        };
        if body.is_empty() {
            // A success status with no bytes means the transfer was cut short.
            return FetchOutcome::Failed(FetchFailure::Timeout);
        }

        let stored = match self.uploads.store(&file_name, &body, partition).await {
            Ok(stored) => stored,
            Err(e) => {
                return FetchOutcome::Failed(FetchFailure::Storage {
                    message: e.to_string(),
                });
            }
        };

        let size = tokio::fs::metadata(&stored.path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if size == 0 {
            self.uploads.remove(&stored.path).await;
            return FetchOutcome::Failed(FetchFailure::EmptyFile);
        }

        debug!(path = %stored.path.display(), size, "fetched");
        FetchOutcome::Fetched {
            local_path: stored.path,
            local_url: stored.url,
        }
    }
}

fn transport_failure(e: &reqwest::Error) -> FetchFailure {
    if e.is_timeout() {
        FetchFailure::Timeout
    } else {
        FetchFailure::Network {
            message: e.to_string(),
        }
    }
}
