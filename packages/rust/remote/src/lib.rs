//! Remote side of an import: probing, eligibility, and downloading.
//!
//! This crate provides:
//! - [`Prober`]: header-only `HEAD` probes, memoized per run in a [`ProbeCache`]
//! - [`EligibilityChecker`]: allow-list, probe, and upload-type policy
//! - [`Fetcher`]: downloads eligible files into an [`UploadDir`]

mod eligibility;
mod fetcher;
mod naming;
mod probe;
mod uploads;

use reqwest::Client;

use attachport_shared::{AttachportError, ImportConfig, Result};

pub use eligibility::{AllowList, EligibilityChecker};
pub use fetcher::Fetcher;
pub use naming::{MAX_EXTENSION_LEN, extension_of, is_plausible_extension, local_file_name};
pub use probe::{ProbeCache, Prober, file_info_from_headers};
pub use uploads::{StoredFile, UploadDir};

/// Build the HTTP client shared by probes and downloads.
///
/// Per-request total timeouts are applied by the caller; the client only
/// carries the connect timeout and redirect limit.
pub fn build_client(config: &ImportConfig) -> Result<Client> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .connect_timeout(config.connect_timeout)
        .build()
        .map_err(|e| AttachportError::Network(format!("failed to build HTTP client: {e}")))
}
