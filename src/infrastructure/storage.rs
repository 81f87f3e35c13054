use crate::config::{AppConfig, StorageBackend};
use crate::services::storage::{LocalStorage, ObjectStore, S3Storage};
use anyhow::{Context, anyhow};
use aws_sdk_s3::config::Region;
use std::sync::Arc;
use tracing::info;

/// Build the object store selected by configuration. Called once at start-up.
pub async fn setup_storage(config: &AppConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match config.storage_backend {
        StorageBackend::Local => {
            info!(
                "📁 Local Storage: {} (served at {})",
                config.local_storage_path, config.local_storage_base_url
            );
            let storage = LocalStorage::new(
                &config.local_storage_path,
                config.local_storage_base_url.clone(),
            )
            .await
            .with_context(|| {
                format!(
                    "Failed to initialise storage directory {}",
                    config.local_storage_path
                )
            })?;
            Ok(Arc::new(storage))
        }
        StorageBackend::S3 => Ok(Arc::new(setup_s3(config).await?)),
    }
}

async fn setup_s3(config: &AppConfig) -> anyhow::Result<S3Storage> {
    let endpoint_url = config
        .s3_endpoint
        .clone()
        .ok_or_else(|| anyhow!("S3_ENDPOINT must be set for the s3 backend"))?;
    let bucket = config
        .s3_bucket
        .clone()
        .ok_or_else(|| anyhow!("S3_BUCKET must be set for the s3 backend"))?;
    let access_key = config
        .s3_access_key
        .clone()
        .ok_or_else(|| anyhow!("S3_ACCESS_KEY must be set for the s3 backend"))?;
    let secret_key = config
        .s3_secret_key
        .clone()
        .ok_or_else(|| anyhow!("S3_SECRET_KEY must be set for the s3 backend"))?;

    info!("☁️  S3 Storage: {} (Bucket: {})", endpoint_url, bucket);

    let aws_config = aws_config::from_env()
        .endpoint_url(&endpoint_url)
        .region(Region::new(config.s3_region.clone()))
        .credentials_provider(aws_sdk_s3::config::Credentials::new(
            access_key, secret_key, None, None, "static",
        ))
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(true)
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

    // Ensure bucket exists
    match s3_client.head_bucket().bucket(&bucket).send().await {
        Ok(_) => info!("✅ Bucket '{}' is ready", bucket),
        Err(_) => {
            info!("🪣 Bucket '{}' not found, creating...", bucket);
            if let Err(e) = s3_client.create_bucket().bucket(&bucket).send().await {
                tracing::error!("❌ Failed to create bucket '{}': {}", bucket, e);
            } else {
                info!("✅ Bucket '{}' created successfully", bucket);
            }
        }
    }

    let public_url = config
        .s3_public_url
        .clone()
        .unwrap_or_else(|| format!("{}/{}", endpoint_url.trim_end_matches('/'), bucket));

    Ok(S3Storage::new(s3_client, bucket, public_url))
}
