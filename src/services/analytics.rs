use crate::entities::{prelude::*, *};
use axum::http::{HeaderMap, header};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use tokio_util::task::TaskTracker;
use uuid::Uuid;

/// What we know about the client behind a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

impl ClientInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let ip_address = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or("").trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string())
            });

        let header_string = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };

        Self {
            ip_address,
            user_agent: header_string(header::USER_AGENT),
            referrer: header_string(header::REFERER),
        }
    }
}

/// Fire-and-forget view and click logging.
///
/// Every write runs on its own task after the response has been decided.
/// Failures are logged at warn level and never reach the requester.
#[derive(Clone)]
pub struct AnalyticsRecorder {
    db: DatabaseConnection,
    tracker: TaskTracker,
}

impl AnalyticsRecorder {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            tracker: TaskTracker::new(),
        }
    }

    pub fn record_view(&self, upload_id: String, client: ClientInfo) {
        let db = self.db.clone();
        self.tracker.spawn(async move {
            if let Err(e) = write_view(&db, &upload_id, client).await {
                tracing::warn!(upload_id = %upload_id, error = %e, "Failed to record view");
            }
        });
    }

    pub fn record_click(&self, link_id: String, client: ClientInfo) {
        let db = self.db.clone();
        self.tracker.spawn(async move {
            if let Err(e) = write_click(&db, &link_id, client).await {
                tracing::warn!(link_id = %link_id, error = %e, "Failed to record click");
            }
        });
    }

    /// Wait for every write spawned so far to finish.
    pub async fn flush(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

/// Counter bump and log row commit together, or not at all.
async fn write_view(db: &DatabaseConnection, upload_id: &str, client: ClientInfo) -> Result<(), DbErr> {
    let now = Utc::now();
    let txn = db.begin().await?;

    let res = Uploads::update_many()
        .col_expr(uploads::Column::Views, Expr::col(uploads::Column::Views).add(1))
        .col_expr(uploads::Column::LastViewedAt, Expr::value(now))
        .filter(uploads::Column::Id.eq(upload_id))
        .exec(&txn)
        .await?;

    if res.rows_affected == 0 {
        // Deleted between delivery and logging
        txn.rollback().await?;
        return Ok(());
    }

    view_logs::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        upload_id: Set(upload_id.to_string()),
        ip_address: Set(client.ip_address),
        user_agent: Set(client.user_agent),
        referrer: Set(client.referrer),
        viewed_at: Set(now),
    }
    .insert(&txn)
    .await?;

    txn.commit().await
}

async fn write_click(db: &DatabaseConnection, link_id: &str, client: ClientInfo) -> Result<(), DbErr> {
    let now = Utc::now();
    let txn = db.begin().await?;

    let res = ShortLinks::update_many()
        .col_expr(short_links::Column::Clicks, Expr::col(short_links::Column::Clicks).add(1))
        .col_expr(short_links::Column::LastClickedAt, Expr::value(now))
        .filter(short_links::Column::Id.eq(link_id))
        .exec(&txn)
        .await?;

    if res.rows_affected == 0 {
        txn.rollback().await?;
        return Ok(());
    }

    link_clicks::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        short_link_id: Set(link_id.to_string()),
        ip_address: Set(client.ip_address),
        user_agent: Set(client.user_agent),
        referrer: Set(client.referrer),
        clicked_at: Set(now),
    }
    .insert(&txn)
    .await?;

    txn.commit().await
}
