//! Stored-image capability.
//!
//! The contest logic only ever talks to [`ImageStore`]; which backend sits
//! behind it is a deployment decision. The shipped backend keeps files on
//! local disk and serves them back under `/uploads/`.

use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::fs;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persists `bytes` and returns a public URL for the stored image.
    async fn store(
        &self,
        bytes: &[u8],
        content_type: &str,
        path_hint: &str,
    ) -> Result<String, AppError>;

    /// Removes a previously stored image. Absent references are a no-op, not
    /// an error.
    async fn delete(&self, url: &str) -> Result<(), io::Error>;
}

pub struct LocalStore {
    root: PathBuf,
    public_base: String,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, public_base: &str) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    fn file_name(&self, content_type: &str, path_hint: &str) -> String {
        let ext = match content_type {
            "image/png" => "png",
            "image/jpeg" => "jpg",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => "bin",
        };

        let hint: String = path_hint
            .chars()
            .map(|c| if c.is_whitespace() { '-' } else { c })
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .take(24)
            .collect();

        if hint.is_empty() {
            format!("{}.{ext}", Uuid::new_v4())
        } else {
            format!("{hint}-{}.{ext}", Uuid::new_v4())
        }
    }

    /// Maps a stored URL back to its on-disk path. `None` for URLs that do
    /// not point into this store.
    fn path_for(&self, url: &str) -> Option<PathBuf> {
        let name = url.rsplit('/').next()?;
        if name.is_empty() || Path::new(name).file_name()?.to_str()? != name {
            return None;
        }

        Some(self.root.join(name))
    }
}

#[async_trait]
impl ImageStore for LocalStore {
    async fn store(
        &self,
        bytes: &[u8],
        content_type: &str,
        path_hint: &str,
    ) -> Result<String, AppError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(AppError::UploadFailed)?;

        let name = self.file_name(content_type, path_hint);
        let path = self.root.join(&name);
        fs::write(&path, bytes)
            .await
            .map_err(AppError::UploadFailed)?;

        info!("stored image at {}", path.display());
        Ok(format!("{}/uploads/{name}", self.public_base))
    }

    async fn delete(&self, url: &str) -> Result<(), io::Error> {
        let Some(path) = self.path_for(url) else {
            return Ok(());
        };

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> LocalStore {
        LocalStore::new(dir.path(), "")
    }

    #[tokio::test]
    async fn test_store_writes_file_and_addresses_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let url = store
            .store(b"png-bytes", "image/png", "Summer Look")
            .await
            .unwrap();
        assert!(url.starts_with("/uploads/Summer-Look-"));
        assert!(url.ends_with(".png"));

        let name = url.rsplit('/').next().unwrap();
        let on_disk = dir.path().join(name);
        assert_eq!(std::fs::read(on_disk).unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn test_delete_removes_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let url = store.store(b"data", "image/jpeg", "").await.unwrap();
        let name = url.rsplit('/').next().unwrap().to_string();

        store.delete(&url).await.unwrap();
        assert!(!dir.path().join(&name).exists());

        // Second delete and foreign URLs are both no-ops.
        store.delete(&url).await.unwrap();
        store.delete("https://elsewhere.example/img.png").await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_content_type_gets_opaque_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let url = store.store(b"data", "application/zip", "hint").await.unwrap();
        assert!(url.ends_with(".bin"));
    }

    #[tokio::test]
    async fn test_public_base_prefixes_urls() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), "https://contest.example.com/");

        let url = store.store(b"data", "image/png", "").await.unwrap();
        assert!(url.starts_with("https://contest.example.com/uploads/"));
    }
}
