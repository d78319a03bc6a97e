//! Import eligibility policy for a candidate URL.

use attachport_shared::{EligibilityDecision, IneligibleReason, UploadTypeRegistry};
use tracing::{debug, instrument};
use url::Url;

use crate::probe::Prober;

/// Host names whose files may be imported. Empty means every host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    hosts: Vec<String>,
}

impl AllowList {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::default();
        for host in hosts {
            list.push(host.as_ref());
        }
        list
    }

    /// Add a host; duplicates and blank entries are ignored.
    pub fn with_host(mut self, host: &str) -> Self {
        self.push(host);
        self
    }

    fn push(&mut self, host: &str) {
        let host = host.trim().to_ascii_lowercase();
        if !host.is_empty() && !self.hosts.contains(&host) {
            self.hosts.push(host);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Exact, case-insensitive host match. Subdomains are not implied.
    pub fn permits(&self, host: &str) -> bool {
        self.hosts.is_empty() || self.hosts.iter().any(|h| h.eq_ignore_ascii_case(host))
    }
}

/// Decides whether a URL may be imported.
///
/// Checks run cheapest first: URL shape, host allow-list, then a (memoized)
/// probe, then the upload-type registry against the file name the server
/// reported (or the URL implies). A missing name is never supported.
#[derive(Debug, Clone)]
pub struct EligibilityChecker {
    prober: Prober,
    allow_list: AllowList,
}

impl EligibilityChecker {
    pub fn new(prober: Prober, allow_list: AllowList) -> Self {
        Self { prober, allow_list }
    }

    pub fn prober(&self) -> &Prober {
        &self.prober
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    #[instrument(skip(self, registry), fields(url = %url))]
    pub async fn check(&self, url: &str, registry: &dyn UploadTypeRegistry) -> EligibilityDecision {
        let decision = self.evaluate(url, registry).await;
        if let EligibilityDecision::Ineligible(reason) = &decision {
            debug!(%reason, "ineligible");
        }
        decision
    }

    async fn evaluate(&self, url: &str, registry: &dyn UploadTypeRegistry) -> EligibilityDecision {
        let Ok(parsed) = Url::parse(url) else {
            return EligibilityDecision::Ineligible(IneligibleReason::UnparsableUrl);
        };
        let Some(host) = parsed.host_str().filter(|h| !h.is_empty()) else {
            return EligibilityDecision::Ineligible(IneligibleReason::UnparsableUrl);
        };

        if !self.allow_list.permits(host) {
            return EligibilityDecision::Ineligible(IneligibleReason::DomainNotAllowed {
                host: host.to_ascii_lowercase(),
            });
        }

        let Some(info) = self.prober.probe(url).await else {
            return EligibilityDecision::Ineligible(IneligibleReason::ProbeFailed);
        };

        let file_name = info
            .file_name
            .as_deref()
            .map(|name| match urlencoding::decode(name) {
                Ok(decoded) => decoded.into_owned(),
                Err(_) => name.to_string(),
            })
            .unwrap_or_default();
        if file_name.is_empty() || registry.check(&file_name).is_none() {
            return EligibilityDecision::Ineligible(IneligibleReason::UnsupportedType { file_name });
        }

        EligibilityDecision::Eligible
    }
}
