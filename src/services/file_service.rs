use crate::api::error::AppError;
use crate::entities::{prelude::*, *};
use crate::services::storage::ObjectStore;
use chrono::Utc;
use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Deletion of uploads and everything hanging off them.
///
/// Records go first, inside a transaction; stored bytes are removed afterwards
/// and a failing object delete only produces a warning.
pub struct FileService {
    db: DatabaseConnection,
    storage: Arc<dyn ObjectStore>,
}

impl FileService {
    pub fn new(db: DatabaseConnection, storage: Arc<dyn ObjectStore>) -> Self {
        Self { db, storage }
    }

    /// Delete one upload owned by `user_id`. Another user's upload is reported
    /// as not found.
    pub async fn delete_upload(&self, user_id: &str, id: &str) -> Result<(), AppError> {
        let txn = self.db.begin().await?;

        let upload = Uploads::find_by_id(id)
            .filter(uploads::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

        ViewLogs::delete_many()
            .filter(view_logs::Column::UploadId.eq(&upload.id))
            .exec(&txn)
            .await?;

        // A concurrent delete may have won since the lookup; only the winner
        // gives the bytes back to the quota.
        let deleted = Uploads::delete_many()
            .filter(uploads::Column::Id.eq(&upload.id))
            .filter(uploads::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        if deleted.rows_affected == 0 {
            txn.rollback().await?;
            return Err(AppError::NotFound("File not found".to_string()));
        }

        // Saturating: usage never goes negative
        let decremented: SimpleExpr = Expr::case(
            Expr::col(user_settings::Column::StorageUsed).gt(upload.size),
            Expr::col(user_settings::Column::StorageUsed).sub(upload.size),
        )
        .finally(Expr::value(0i64))
        .into();

        UserSettings::update_many()
            .col_expr(user_settings::Column::StorageUsed, decremented)
            .col_expr(user_settings::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(user_settings::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        self.remove_objects(&upload).await;

        info!(code = %upload.code, user_id = %user_id, "Upload deleted");
        Ok(())
    }

    /// Remove every upload and short link of a user and reset their usage.
    ///
    /// Called when the account itself is being deleted elsewhere.
    pub async fn purge_user(&self, user_id: &str) -> Result<usize, AppError> {
        let uploads = Uploads::find()
            .filter(uploads::Column::UserId.eq(user_id))
            .all(&self.db)
            .await?;

        let upload_ids: Vec<String> = uploads.iter().map(|u| u.id.clone()).collect();

        let link_ids: Vec<String> = ShortLinks::find()
            .select_only()
            .column(short_links::Column::Id)
            .filter(short_links::Column::UserId.eq(user_id))
            .into_tuple()
            .all(&self.db)
            .await?;

        let txn = self.db.begin().await?;

        if !upload_ids.is_empty() {
            ViewLogs::delete_many()
                .filter(view_logs::Column::UploadId.is_in(upload_ids.clone()))
                .exec(&txn)
                .await?;
        }

        Uploads::delete_many()
            .filter(uploads::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;

        if !link_ids.is_empty() {
            LinkClicks::delete_many()
                .filter(link_clicks::Column::ShortLinkId.is_in(link_ids))
                .exec(&txn)
                .await?;
        }

        ShortLinks::delete_many()
            .filter(short_links::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;

        UserSettings::update_many()
            .col_expr(user_settings::Column::StorageUsed, Expr::value(0i64))
            .col_expr(user_settings::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(user_settings::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        for upload in &uploads {
            self.remove_objects(upload).await;
        }

        info!(user_id = %user_id, count = uploads.len(), "Purged user uploads");
        Ok(uploads.len())
    }

    async fn remove_objects(&self, upload: &uploads::Model) {
        let paths = std::iter::once(&upload.storage_path).chain(upload.thumbnail_path.as_ref());
        for path in paths.filter(|p| !p.is_empty()) {
            match self.storage.delete(path).await {
                Ok(true) => {}
                Ok(false) => warn!(path = %path, "Stored object was already gone"),
                Err(e) => warn!(path = %path, "Failed to delete stored object: {}", e),
            }
        }
    }
}
