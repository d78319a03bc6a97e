//! Application configuration for attachport.
//!
//! User config lives at `~/.attachport/attachport.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AttachportError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "attachport.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".attachport";

/// Link targets with these extensions are treated as importable documents/media.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "ppt", "pptx", "pps", "ppsx", "odt", "xls", "xlsx", "mp3", "m4a", "ogg",
    "wav", "mp4", "m4v", "mov", "wmv", "avi", "mpg", "ogv", "3gp", "3g2", "jpg", "jpeg", "png",
    "gif",
];

/// Path marker the legacy platform uses for extension-less hosted assets.
pub const DEFAULT_ASSET_MARKER: &str = "/.a/";

// ---------------------------------------------------------------------------
// Config structs (matching attachport.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Import policy.
    #[serde(default)]
    pub import: ImportSection,

    /// Outbound HTTP settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Candidate extraction settings.
    #[serde(default)]
    pub extract: ExtractConfig,

    /// Local database and upload locations.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[import]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSection {
    /// Hosts files may be imported from. Empty means any host.
    #[serde(default)]
    pub domains: Vec<String>,

    /// Content units imported concurrently by batch runs.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

impl Default for ImportSection {
    fn default() -> Self {
        Self {
            domains: Vec::new(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> u32 {
    4
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Total time allowed for a header-only probe.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Total time allowed for a full download.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            download_timeout_secs: default_download_timeout(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    5
}
fn default_probe_timeout() -> u64 {
    15
}
fn default_download_timeout() -> u64 {
    30
}
fn default_max_redirects() -> usize {
    10
}
fn default_user_agent() -> String {
    concat!("attachport/", env!("CARGO_PKG_VERSION")).into()
}

/// `[extract]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Link extensions that mark a hyperlink as an importable file.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Path marker identifying legacy hosted assets regardless of extension.
    #[serde(default = "default_asset_marker")]
    pub asset_marker: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
            asset_marker: default_asset_marker(),
        }
    }
}

fn default_allowed_extensions() -> Vec<String> {
    DEFAULT_ALLOWED_EXTENSIONS
        .iter()
        .map(|e| (*e).to_string())
        .collect()
}
fn default_asset_marker() -> String {
    DEFAULT_ASSET_MARKER.into()
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// libSQL database holding content, attachments, and import markers.
    #[serde(default = "default_database")]
    pub database: String,

    /// Directory imported files are written under (`YYYY/MM/...`).
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: String,

    /// Public URL that `uploads_dir` is served from.
    #[serde(default = "default_uploads_url")]
    pub uploads_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            uploads_dir: default_uploads_dir(),
            uploads_url: default_uploads_url(),
        }
    }
}

impl StorageConfig {
    pub fn database_path(&self) -> Result<PathBuf> {
        expand_home(&self.database)
    }

    pub fn uploads_path(&self) -> Result<PathBuf> {
        expand_home(&self.uploads_dir)
    }
}

fn default_database() -> String {
    "~/.attachport/attachport.db".into()
}
fn default_uploads_dir() -> String {
    "~/.attachport/uploads".into()
}
fn default_uploads_url() -> String {
    "http://localhost/uploads".into()
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| AttachportError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

// ---------------------------------------------------------------------------
// Import config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime import configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Lower-cased, de-duplicated host allow-list. Empty disables the check.
    pub allow_list: Vec<String>,
    /// Units processed concurrently by batch runs.
    pub concurrency: usize,
    pub connect_timeout: Duration,
    pub probe_timeout: Duration,
    pub download_timeout: Duration,
    pub max_redirects: usize,
    pub user_agent: String,
    pub extract: ExtractConfig,
}

impl ImportConfig {
    /// Replace the allow-list.
    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allow_list = normalize_domains(domains);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ImportConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            allow_list: normalize_domains(&config.import.domains),
            concurrency: (config.import.concurrency as usize).max(1),
            connect_timeout: Duration::from_secs(config.http.connect_timeout_secs),
            probe_timeout: Duration::from_secs(config.http.probe_timeout_secs),
            download_timeout: Duration::from_secs(config.http.download_timeout_secs),
            max_redirects: config.http.max_redirects,
            user_agent: config.http.user_agent.clone(),
            extract: config.extract.clone(),
        }
    }
}

/// Trim, lower-case, and de-duplicate hosts, keeping first-seen order.
fn normalize_domains<I, S>(domains: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for domain in domains {
        let domain = domain.as_ref().trim().to_ascii_lowercase();
        if !domain.is_empty() && !out.contains(&domain) {
            out.push(domain);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.attachport/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AttachportError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.attachport/attachport.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AttachportError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| AttachportError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    init_config_at(&path)?;
    Ok(path)
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| AttachportError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| AttachportError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| AttachportError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("asset_marker"));
        assert!(toml_str.contains("uploads_url"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[import]
domains = ["Old.Example", "old.example", " media.old.example "]

[http]
download_timeout_secs = 60
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.http.download_timeout_secs, 60);
        assert_eq!(config.http.max_redirects, 10);
        assert_eq!(config.extract.asset_marker, "/.a/");

        let import = ImportConfig::from(&config);
        assert_eq!(import.allow_list, vec!["old.example", "media.old.example"]);
        assert_eq!(import.download_timeout, Duration::from_secs(60));
        assert_eq!(import.connect_timeout, Duration::from_secs(5));
        assert_eq!(import.concurrency, 4);
    }

    #[test]
    fn cli_overrides_replace_domains() {
        let import = ImportConfig::default()
            .with_domains(["A.example"])
            .with_concurrency(0);
        assert_eq!(import.allow_list, vec!["a.example"]);
        assert_eq!(import.concurrency, 1);
    }

    #[test]
    fn init_and_load_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        init_config_at(&path).expect("init config");

        let loaded = load_config_from(&path).expect("load config");
        assert_eq!(loaded.import.concurrency, 4);
        assert!(loaded.extract.allowed_extensions.contains(&"pdf".to_string()));
    }

    #[test]
    fn malformed_config_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[import\ndomains = 3").expect("write");
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().starts_with("config error"));
    }

    #[test]
    fn absolute_storage_paths_are_kept() {
        let storage = StorageConfig {
            database: "/var/lib/attachport/db".into(),
            ..StorageConfig::default()
        };
        assert_eq!(
            storage.database_path().unwrap(),
            PathBuf::from("/var/lib/attachport/db")
        );
    }
}
