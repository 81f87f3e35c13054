//! Object storage abstraction.
//!
//! Both backends lay objects out as `{year}/{month}/{logical_name}` so a stored
//! path means the same thing regardless of where the bytes live. Paths are
//! relative and only ever interpreted by the configured backend.

pub mod local;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Datelike, Utc};
use futures::stream::BoxStream;
use thiserror::Error;

pub use local::LocalStorage;
pub use s3::S3Storage;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Transport(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Body of a stored object, streamed chunk by chunk.
pub struct ObjectStream {
    pub size: Option<u64>,
    pub body: BoxStream<'static, std::io::Result<Bytes>>,
}

impl ObjectStream {
    /// Drain the stream into memory.
    pub async fn into_bytes(self) -> std::io::Result<Bytes> {
        use futures::TryStreamExt;

        let chunks: Vec<Bytes> = self.body.try_collect().await?;
        Ok(Bytes::from(chunks.concat()))
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Persist `data` and return the backend-relative path it was stored under.
    async fn save(&self, data: Bytes, logical_name: &str, content_type: &str)
    -> StorageResult<String>;

    /// `Ok(None)` when nothing is stored under `path`.
    async fn read(&self, path: &str) -> StorageResult<Option<ObjectStream>>;

    /// `Ok(false)` when nothing was stored under `path`.
    async fn delete(&self, path: &str) -> StorageResult<bool>;

    async fn exists(&self, path: &str) -> StorageResult<bool>;

    fn public_url(&self, path: &str) -> String;
}

/// Build the dated relative path for a logical object name.
pub fn dated_path(now: DateTime<Utc>, logical_name: &str) -> String {
    format!("{}/{:02}/{}", now.year(), now.month(), logical_name)
}

/// Reject names that could escape the storage root or nest directories.
pub fn validate_logical_name(name: &str) -> StorageResult<()> {
    if name.is_empty() || name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(StorageError::InvalidPath(name.to_string()));
    }
    Ok(())
}

/// Reject relative paths that could resolve outside the storage root.
pub fn validate_path(path: &str) -> StorageResult<()> {
    if path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.split('/').any(|segment| segment.is_empty() || segment == "..")
    {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}
