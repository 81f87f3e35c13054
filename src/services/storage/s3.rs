use super::{
    ObjectStore, ObjectStream, StorageError, StorageResult, dated_path, validate_logical_name,
    validate_path,
};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use tokio_util::io::ReaderStream;

/// `None` when the key is missing, otherwise the transport failure.
fn get_failure(err: GetObjectError) -> Option<StorageError> {
    if err.is_no_such_key() {
        None
    } else {
        Some(StorageError::Transport(err.to_string()))
    }
}

fn head_failure(err: HeadObjectError) -> Option<StorageError> {
    if err.is_not_found() {
        None
    } else {
        Some(StorageError::Transport(err.to_string()))
    }
}

/// S3 / MinIO backend. The dated path is used verbatim as the object key.
pub struct S3Storage {
    client: Client,
    bucket: String,
    public_url: String,
}

impl S3Storage {
    pub fn new(client: Client, bucket: String, public_url: String) -> Self {
        Self {
            client,
            bucket,
            public_url,
        }
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    async fn save(
        &self,
        data: Bytes,
        logical_name: &str,
        content_type: &str,
    ) -> StorageResult<String> {
        validate_logical_name(logical_name)?;
        let key = dated_path(Utc::now(), logical_name);
        let size = data.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    "S3 put_object failed: bucket={}, key={}, error={:?}",
                    self.bucket,
                    key,
                    e
                );
                StorageError::Transport(e.into_service_error().to_string())
            })?;

        tracing::debug!(key = %key, size_bytes = size, "S3 upload successful");
        Ok(key)
    }

    async fn read(&self, path: &str) -> StorageResult<Option<ObjectStream>> {
        validate_path(path)?;

        let res = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await;

        match res {
            Ok(output) => {
                let size = output
                    .content_length
                    .and_then(|len| u64::try_from(len).ok());
                let reader = output.body.into_async_read();
                Ok(Some(ObjectStream {
                    size,
                    body: ReaderStream::new(reader).boxed(),
                }))
            }
            Err(e) => match get_failure(e.into_service_error()) {
                None => Ok(None),
                Some(err) => Err(err),
            },
        }
    }

    async fn delete(&self, path: &str) -> StorageResult<bool> {
        // S3 reports success for missing keys, so existence has to be checked first.
        if !self.exists(path).await? {
            return Ok(false);
        }

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.into_service_error().to_string()))?;
        Ok(true)
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        validate_path(path)?;

        let res = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await;

        match res {
            Ok(_) => Ok(true),
            Err(e) => match head_failure(e.into_service_error()) {
                None => Ok(false),
                Some(err) => Err(err),
            },
        }
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_url.trim_end_matches('/'), path)
    }
}
