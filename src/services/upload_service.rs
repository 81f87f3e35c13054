use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::entities::{prelude::*, *};
use crate::services::identifier::{
    self, CodeGenerator, CodeStrategy, MAX_CODE_ATTEMPTS, RandomCodeGenerator,
};
use crate::services::imaging::{self, THUMB_CONTENT_TYPE, THUMB_EXTENSION, THUMB_MAX_HEIGHT, THUMB_MAX_WIDTH};
use crate::services::storage::ObjectStore;
use crate::utils::validation::{file_extension, resolve_content_type, sanitize_filename, sniffed_extension};
use bytes::Bytes;
use chrono::Utc;
use sea_orm::sea_query::{Condition, Expr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, Set, SqlErr, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Conflicts tolerated at insert time on top of the allocation attempts
const MAX_INSERT_CONFLICTS: usize = 5;

/// One file handed over by the HTTP layer.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub user_id: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// A committed upload and the URLs it is reachable under.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub upload: uploads::Model,
    pub url: String,
    pub delete_url: String,
    pub thumbnail_url: Option<String>,
    pub direct_url: String,
}

struct StoredObjects {
    original: String,
    thumbnail: Option<String>,
}

/// Turns an authenticated upload into a stored object plus record.
///
/// Quota and approval checks run before any storage write. The short code is
/// claimed by inserting the record inside a transaction, so bytes are only ever
/// written under a code this request owns.
pub struct UploadService {
    db: DatabaseConnection,
    storage: Arc<dyn ObjectStore>,
    config: Arc<AppConfig>,
    generator: Arc<dyn CodeGenerator>,
}

impl UploadService {
    pub fn new(db: DatabaseConnection, storage: Arc<dyn ObjectStore>, config: Arc<AppConfig>) -> Self {
        Self {
            db,
            storage,
            config,
            generator: Arc::new(RandomCodeGenerator),
        }
    }

    /// Replace the code source, e.g. with a deterministic one.
    pub fn with_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Load the user's settings, creating them from configured defaults on first use.
    pub async fn ensure_settings(&self, user_id: &str) -> Result<user_settings::Model, AppError> {
        if let Some(settings) = UserSettings::find_by_id(user_id).one(&self.db).await? {
            return Ok(settings);
        }

        let now = Utc::now();
        let defaults = user_settings::ActiveModel {
            user_id: Set(user_id.to_string()),
            max_file_size: Set(self.config.default_max_file_size),
            max_storage: Set(self.config.default_max_storage),
            storage_used: Set(0),
            use_word_codes: Set(false),
            custom_words: Set(None),
            embed_title: Set(None),
            embed_author: Set(None),
            embed_footer: Set(None),
            embed_color: Set(None),
            show_stats: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match defaults.insert(&self.db).await {
            Ok(settings) => Ok(settings),
            // Another request created them first
            Err(e) if is_unique_violation(&e) => {
                UserSettings::find_by_id(user_id)
                    .one(&self.db)
                    .await?
                    .ok_or_else(|| AppError::Internal("User settings vanished".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn ingest(&self, req: UploadRequest) -> Result<UploadOutcome, AppError> {
        let user = Users::find_by_id(req.user_id.clone())
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Unknown user".to_string()))?;

        if !user.is_approved && !self.config.auto_approve_users {
            return Err(AppError::Forbidden(
                "Account is awaiting approval".to_string(),
            ));
        }

        if req.data.is_empty() {
            return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
        }

        let settings = self.ensure_settings(&user.id).await?;
        let size = req.data.len() as i64;
        check_quota(&settings, size)?;

        let filename =
            sanitize_filename(&req.filename).map_err(|e| AppError::BadRequest(e.to_string()))?;
        let content_type = resolve_content_type(req.content_type.as_deref(), &req.data);
        let extension = file_extension(&filename).or_else(|| sniffed_extension(&req.data));

        let (dimensions, thumbnail) = if imaging::is_image(&content_type) {
            self.introspect(req.data.clone()).await
        } else {
            (None, None)
        };

        let strategy = CodeStrategy::for_user(
            settings.use_word_codes,
            settings.word_list(),
            self.config.code_length,
        );

        let mut attempt = 0;
        loop {
            if attempt >= MAX_CODE_ATTEMPTS + MAX_INSERT_CONFLICTS {
                return Err(AppError::Internal(
                    "Could not allocate a unique short code".to_string(),
                ));
            }

            let code = identifier::candidate(self.generator.as_ref(), &strategy, attempt);
            attempt += 1;

            let txn = self.db.begin().await?;

            let taken = Uploads::find()
                .filter(uploads::Column::Code.eq(&code))
                .one(&txn)
                .await?
                .is_some();
            if taken {
                txn.rollback().await?;
                continue;
            }

            let record = uploads::ActiveModel {
                id: Set(Uuid::new_v4().to_string()),
                user_id: Set(user.id.clone()),
                code: Set(code.clone()),
                filename: Set(filename.clone()),
                content_type: Set(content_type.clone()),
                size: Set(size),
                storage_path: Set(String::new()),
                thumbnail_path: Set(None),
                width: Set(dimensions.map(|(w, _)| w as i32)),
                height: Set(dimensions.map(|(_, h)| h as i32)),
                is_public: Set(true),
                views: Set(0),
                last_viewed_at: Set(None),
                created_at: Set(Utc::now()),
            };

            let mut upload = match record.insert(&txn).await {
                Ok(model) => model,
                Err(e) if is_unique_violation(&e) => {
                    info!(code = %code, "Short code claimed concurrently, retrying");
                    txn.rollback().await?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            charge_quota(&txn, &user.id, size).await?;

            let logical_name = match &extension {
                Some(ext) => format!("{}.{}", code, ext),
                None => code.clone(),
            };

            let stored = self
                .store_objects(&code, &logical_name, &content_type, &req.data, thumbnail.clone())
                .await?;

            let finalized = Uploads::update_many()
                .col_expr(
                    uploads::Column::StoragePath,
                    Expr::value(stored.original.clone()),
                )
                .col_expr(
                    uploads::Column::ThumbnailPath,
                    Expr::value(stored.thumbnail.clone()),
                )
                .filter(uploads::Column::Id.eq(&upload.id))
                .exec(&txn)
                .await;

            let committed = match finalized {
                Ok(_) => txn.commit().await,
                Err(e) => Err(e),
            };

            if let Err(e) = committed {
                self.discard(&stored).await;
                return Err(e.into());
            }

            upload.storage_path = stored.original;
            upload.thumbnail_path = stored.thumbnail;

            info!(
                code = %upload.code,
                user_id = %upload.user_id,
                size = upload.size,
                "Upload stored"
            );

            return Ok(self.outcome(upload));
        }
    }

    /// Dimensions and a thumbnail for an image. Decoding runs on the blocking
    /// pool; any failure leaves the upload without a thumbnail.
    async fn introspect(&self, data: Bytes) -> (Option<(u32, u32)>, Option<Vec<u8>>) {
        let result = tokio::task::spawn_blocking(move || {
            let dimensions = imaging::dimensions(&data);
            let thumbnail = imaging::thumbnail(&data, THUMB_MAX_WIDTH, THUMB_MAX_HEIGHT);
            (dimensions, thumbnail)
        })
        .await;

        match result {
            Ok((dimensions, Ok(thumb))) => (dimensions, Some(thumb)),
            Ok((dimensions, Err(e))) => {
                warn!("Thumbnail generation failed: {}", e);
                (dimensions, None)
            }
            Err(e) => {
                warn!("Image processing task failed: {}", e);
                (None, None)
            }
        }
    }

    async fn store_objects(
        &self,
        code: &str,
        logical_name: &str,
        content_type: &str,
        data: &Bytes,
        thumbnail: Option<Vec<u8>>,
    ) -> Result<StoredObjects, AppError> {
        let original = self
            .storage
            .save(data.clone(), logical_name, content_type)
            .await?;

        let thumbnail = match thumbnail {
            Some(bytes) => {
                let name = format!("thumb_{}.{}", code, THUMB_EXTENSION);
                match self
                    .storage
                    .save(Bytes::from(bytes), &name, THUMB_CONTENT_TYPE)
                    .await
                {
                    Ok(path) => Some(path),
                    Err(e) => {
                        warn!(code = %code, "Failed to store thumbnail: {}", e);
                        None
                    }
                }
            }
            None => None,
        };

        Ok(StoredObjects {
            original,
            thumbnail,
        })
    }

    async fn discard(&self, stored: &StoredObjects) {
        let paths = std::iter::once(&stored.original).chain(stored.thumbnail.as_ref());
        for path in paths {
            if let Err(e) = self.storage.delete(path).await {
                warn!(path = %path, "Failed to remove orphaned object: {}", e);
            }
        }
    }

    fn outcome(&self, upload: uploads::Model) -> UploadOutcome {
        UploadOutcome {
            url: self.config.delivery_url(&upload.code),
            delete_url: self.config.delete_url(&upload.id),
            thumbnail_url: upload
                .thumbnail_path
                .as_ref()
                .map(|_| self.config.thumbnail_url(&upload.code)),
            direct_url: self.storage.public_url(&upload.storage_path),
            upload,
        }
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Reject uploads that would break the per-file or cumulative limit.
pub fn check_quota(settings: &user_settings::Model, size: i64) -> Result<(), AppError> {
    if size > settings.max_file_size {
        return Err(AppError::PayloadTooLarge(format!(
            "File exceeds the maximum size of {} bytes",
            settings.max_file_size
        )));
    }

    if let Some(max_storage) = settings.max_storage {
        if settings.storage_used.saturating_add(size) > max_storage {
            return Err(AppError::PayloadTooLarge(
                "Storage limit exceeded".to_string(),
            ));
        }
    }

    Ok(())
}

/// Add `size` to the user's usage unless that would pass their storage limit.
async fn charge_quota(txn: &DatabaseTransaction, user_id: &str, size: i64) -> Result<(), AppError> {
    let res = UserSettings::update_many()
        .col_expr(
            user_settings::Column::StorageUsed,
            Expr::col(user_settings::Column::StorageUsed).add(size),
        )
        .col_expr(user_settings::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(user_settings::Column::UserId.eq(user_id))
        .filter(
            Condition::any()
                .add(user_settings::Column::MaxStorage.is_null())
                .add(
                    Expr::expr(Expr::col(user_settings::Column::StorageUsed).add(size))
                        .lte(Expr::col(user_settings::Column::MaxStorage)),
                ),
        )
        .exec(txn)
        .await?;

    if res.rows_affected == 0 {
        // Usage moved past the limit since the pre-check
        return Err(AppError::PayloadTooLarge(
            "Storage limit exceeded".to_string(),
        ));
    }

    Ok(())
}
