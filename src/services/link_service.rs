use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::entities::{prelude::*, *};
use crate::services::analytics::{AnalyticsRecorder, ClientInfo};
use crate::services::delivery::is_bot;
use crate::services::identifier::{
    self, CodeGenerator, CodeStrategy, MAX_CODE_ATTEMPTS, RandomCodeGenerator,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Longest accepted redirect target
pub const MAX_TARGET_URL_LEN: usize = 2048;

/// Accept only absolute http(s) URLs with a host.
pub fn validate_target(raw: &str) -> Result<url::Url, AppError> {
    let raw = raw.trim();
    if raw.is_empty() || raw.len() > MAX_TARGET_URL_LEN {
        return Err(AppError::BadRequest("Invalid target URL".to_string()));
    }

    let url = url::Url::parse(raw)
        .map_err(|_| AppError::BadRequest("Invalid target URL".to_string()))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(AppError::BadRequest(
            "Only http and https URLs can be shortened".to_string(),
        ));
    }

    Ok(url)
}

pub struct LinkService {
    db: DatabaseConnection,
    config: Arc<AppConfig>,
    analytics: AnalyticsRecorder,
    generator: Arc<dyn CodeGenerator>,
}

impl LinkService {
    pub fn new(db: DatabaseConnection, config: Arc<AppConfig>, analytics: AnalyticsRecorder) -> Self {
        Self {
            db,
            config,
            analytics,
            generator: Arc::new(RandomCodeGenerator),
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Allocate a short code for `target_url` owned by `user_id`.
    pub async fn create(&self, user_id: &str, target_url: &str) -> Result<short_links::Model, AppError> {
        let target = validate_target(target_url)?;

        let words = UserSettings::find_by_id(user_id)
            .one(&self.db)
            .await?
            .map(|s| (s.use_word_codes, s.word_list()))
            .unwrap_or((false, Vec::new()));
        let strategy = CodeStrategy::for_user(words.0, words.1, self.config.code_length);

        for attempt in 0..=MAX_CODE_ATTEMPTS {
            let code = identifier::candidate(self.generator.as_ref(), &strategy, attempt);

            let taken = ShortLinks::find()
                .filter(short_links::Column::Code.eq(&code))
                .one(&self.db)
                .await?
                .is_some();
            if taken {
                continue;
            }

            let link = short_links::ActiveModel {
                id: Set(Uuid::new_v4().to_string()),
                user_id: Set(user_id.to_string()),
                code: Set(code.clone()),
                target_url: Set(target.to_string()),
                clicks: Set(0),
                last_clicked_at: Set(None),
                created_at: Set(Utc::now()),
            };

            match link.insert(&self.db).await {
                Ok(link) => {
                    info!(code = %link.code, user_id = %user_id, "Short link created");
                    return Ok(link);
                }
                Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Internal(
            "Could not allocate a unique short code".to_string(),
        ))
    }

    /// Target of a short link; records a click for non-bot clients.
    pub async fn resolve(&self, code: &str, client: &ClientInfo) -> Result<Option<String>, AppError> {
        let Some(link) = ShortLinks::find()
            .filter(short_links::Column::Code.eq(code))
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        if !is_bot(client.user_agent.as_deref()) {
            self.analytics.record_click(link.id.clone(), client.clone());
        }

        Ok(Some(link.target_url))
    }
}
