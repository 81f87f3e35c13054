use super::{
    ObjectStore, ObjectStream, StorageError, StorageResult, dated_path, validate_logical_name,
    validate_path,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

/// Filesystem backend rooted at a single directory.
///
/// Safe for concurrent requests within one process or across processes sharing
/// the same filesystem.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// # Arguments
    /// * `base_path` - Root directory for stored objects (e.g. "/var/lib/filehost")
    /// * `base_url` - Base URL the root directory is served under
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;

        Ok(Self {
            base_path,
            base_url,
        })
    }

    fn resolve(&self, path: &str) -> StorageResult<PathBuf> {
        validate_path(path)?;
        Ok(self.base_path.join(path))
    }

    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalStorage {
    async fn save(
        &self,
        data: Bytes,
        logical_name: &str,
        _content_type: &str,
    ) -> StorageResult<String> {
        validate_logical_name(logical_name)?;
        let key = dated_path(Utc::now(), logical_name);
        let path = self.resolve(&key)?;

        self.ensure_parent_dir(&path).await?;

        let mut file = fs::File::create(&path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;

        tracing::debug!(
            path = %path.display(),
            key = %key,
            size_bytes = data.len(),
            "Local storage write successful"
        );

        Ok(key)
    }

    async fn read(&self, path: &str) -> StorageResult<Option<ObjectStream>> {
        let full_path = self.resolve(path)?;

        let file = match fs::File::open(&full_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata().await.ok().map(|m| m.len());

        Ok(Some(ObjectStream {
            size,
            body: ReaderStream::new(file).boxed(),
        }))
    }

    async fn delete(&self, path: &str) -> StorageResult<bool> {
        let full_path = self.resolve(path)?;

        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let full_path = self.resolve(path)?;
        Ok(fs::try_exists(&full_path).await?)
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}
