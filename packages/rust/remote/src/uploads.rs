//! Local upload directory, partitioned by year and month.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use attachport_shared::{AttachportError, Result};
use chrono::{DateTime, Datelike, Utc};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Give up on finding a free name after this many suffixes.
const MAX_NAME_ATTEMPTS: u32 = 10_000;

/// A file written into the upload directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Public URL of the file.
    pub url: String,
    /// Final file name, possibly suffixed to avoid a collision.
    pub file_name: String,
}

/// Stores downloaded bytes as `<root>/<YYYY>/<MM>/<name>` and maps them to
/// `<base_url>/<YYYY>/<MM>/<name>`.
#[derive(Debug, Clone)]
pub struct UploadDir {
    root: PathBuf,
    base_url: String,
}

impl UploadDir {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            root: root.into(),
            base_url,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `YYYY/MM` for a partition timestamp.
    pub fn subdir_for(partition: DateTime<Utc>) -> String {
        format!("{:04}/{:02}", partition.year(), partition.month())
    }

    /// Write `bytes` under a name derived from `file_name` that does not
    /// collide with an existing file. On error nothing is left behind.
    pub async fn store(
        &self,
        file_name: &str,
        bytes: &[u8],
        partition: DateTime<Utc>,
    ) -> Result<StoredFile> {
        let subdir = Self::subdir_for(partition);
        let dir = self.root.join(&subdir);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AttachportError::io(&dir, e))?;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = numbered_name(file_name, attempt);
            let path = dir.join(&name);

            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(AttachportError::io(&path, e)),
            };

            let written = async {
                file.write_all(bytes).await?;
                file.flush().await
            }
            .await;
            if let Err(e) = written {
                drop(file);
                self.remove(&path).await;
                return Err(AttachportError::io(&path, e));
            }

            debug!(path = %path.display(), bytes = bytes.len(), "stored upload");
            let url = format!(
                "{}/{}/{}",
                self.base_url,
                subdir,
                urlencoding::encode(&name)
            );
            return Ok(StoredFile {
                path,
                url,
                file_name: name,
            });
        }

        Err(AttachportError::validation(format!(
            "no free file name for {file_name} in {}",
            dir.display()
        )))
    }

    /// Best-effort removal of a stored file.
    pub async fn remove(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "removed upload"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove upload"),
        }
    }
}

/// `name.ext`, `name-1.ext`, `name-2.ext`, ...
fn numbered_name(file_name: &str, n: u32) -> String {
    if n == 0 {
        return file_name.to_string();
    }
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}-{n}.{ext}"),
        _ => format!("{file_name}-{n}"),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn march_2009() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2009, 3, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn numbered_names() {
        assert_eq!(numbered_name("pic.jpg", 0), "pic.jpg");
        assert_eq!(numbered_name("pic.jpg", 2), "pic-2.jpg");
        assert_eq!(numbered_name("README", 1), "README-1");
    }

    #[tokio::test]
    async fn stores_under_year_and_month() {
        let tmp = tempfile::tempdir().unwrap();
        let uploads = UploadDir::new(tmp.path(), "http://new.example/uploads/");

        let stored = uploads.store("pic.jpg", b"jpeg", march_2009()).await.unwrap();
        assert_eq!(stored.path, tmp.path().join("2009/03/pic.jpg"));
        assert_eq!(stored.url, "http://new.example/uploads/2009/03/pic.jpg");
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"jpeg");
    }

    #[tokio::test]
    async fn collisions_get_a_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let uploads = UploadDir::new(tmp.path(), "/uploads");

        let first = uploads.store("pic.jpg", b"1", march_2009()).await.unwrap();
        let second = uploads.store("pic.jpg", b"2", march_2009()).await.unwrap();
        assert_eq!(first.file_name, "pic.jpg");
        assert_eq!(second.file_name, "pic-1.jpg");
        assert_eq!(second.url, "/uploads/2009/03/pic-1.jpg");
        assert_eq!(std::fs::read(&first.path).unwrap(), b"1");
    }

    #[tokio::test]
    async fn urls_are_percent_encoded() {
        let tmp = tempfile::tempdir().unwrap();
        let uploads = UploadDir::new(tmp.path(), "/uploads");
        let stored = uploads.store("café.png", b"x", march_2009()).await.unwrap();
        assert_eq!(stored.url, "/uploads/2009/03/caf%C3%A9.png");
    }

    #[tokio::test]
    async fn blocked_partition_directory_fails_without_writing() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("2009"), b"in the way").unwrap();
        let uploads = UploadDir::new(tmp.path(), "/uploads");

        let err = uploads.store("pic.jpg", b"jpeg", march_2009()).await.unwrap_err();
        assert!(matches!(err, AttachportError::Io { .. }), "{err}");

        let entries: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec!["2009"]);
        assert_eq!(std::fs::read(tmp.path().join("2009")).unwrap(), b"in the way");
    }

    #[tokio::test]
    async fn remove_ignores_missing_files() {
        let tmp = tempfile::tempdir().unwrap();
        let uploads = UploadDir::new(tmp.path(), "/uploads");
        uploads.remove(&tmp.path().join("missing.jpg")).await;
    }
}
