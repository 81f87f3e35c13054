use crate::api::error::AppError;
use crate::entities::{prelude::*, *};
use crate::services::analytics::{AnalyticsRecorder, ClientInfo};
use crate::services::embed::EmbedService;
use crate::services::imaging::{self, THUMB_CONTENT_TYPE};
use crate::services::storage::{ObjectStore, ObjectStream};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;

/// Path prefix selecting the thumbnail variant of an upload
pub const THUMB_PREFIX: &str = "thumb_";

/// Delivered bytes never change under a given code
pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000";

/// Substrings identifying link-preview crawlers, matched case-insensitively
pub const BOT_USER_AGENTS: &[&str] = &[
    "discordbot",
    "twitterbot",
    "facebookexternalhit",
    "slackbot",
    "telegrambot",
    "whatsapp",
    "linkedinbot",
    "embedly",
    "skypeuripreview",
    "redditbot",
    "mastodon",
    "iframely",
    "applebot",
    "googlebot",
    "bingbot",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTarget {
    pub is_thumbnail: bool,
    pub code: String,
}

/// Split a `/f/{segment}` path segment into variant and short code.
///
/// A trailing extension is cosmetic and ignored, so `abc123.png` and `abc123`
/// name the same upload.
pub fn parse_delivery_segment(segment: &str) -> Option<DeliveryTarget> {
    let (is_thumbnail, rest) = match segment.strip_prefix(THUMB_PREFIX) {
        Some(rest) => (true, rest),
        None => (false, segment),
    };

    let code = match rest.rsplit_once('.') {
        Some((code, _ext)) => code,
        None => rest,
    };

    if code.is_empty() || code.contains('/') {
        return None;
    }

    Some(DeliveryTarget {
        is_thumbnail,
        code: code.to_string(),
    })
}

pub fn is_bot(user_agent: Option<&str>) -> bool {
    let Some(ua) = user_agent else {
        return false;
    };
    let ua = ua.to_lowercase();
    BOT_USER_AGENTS.iter().any(|bot| ua.contains(bot))
}

/// Outcome of content negotiation for one delivery request.
pub enum Delivery {
    NotFound,
    EmbedPage(String),
    Stream {
        content_type: String,
        object: ObjectStream,
    },
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "NotFound"),
            Self::EmbedPage(_) => write!(f, "EmbedPage"),
            Self::Stream { content_type, .. } => write!(f, "Stream({})", content_type),
        }
    }
}

/// Decides what a `/f/{segment}` request receives.
pub struct DeliveryService {
    db: DatabaseConnection,
    storage: Arc<dyn ObjectStore>,
    embed: Arc<EmbedService>,
    analytics: AnalyticsRecorder,
}

impl DeliveryService {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn ObjectStore>,
        embed: Arc<EmbedService>,
        analytics: AnalyticsRecorder,
    ) -> Self {
        Self {
            db,
            storage,
            embed,
            analytics,
        }
    }

    pub async fn deliver(&self, segment: &str, client: &ClientInfo) -> Result<Delivery, AppError> {
        let Some(target) = parse_delivery_segment(segment) else {
            return Ok(Delivery::NotFound);
        };

        let upload = Uploads::find()
            .filter(uploads::Column::Code.eq(&target.code))
            .one(&self.db)
            .await?;

        let Some(upload) = upload.filter(|u| u.is_public) else {
            return Ok(Delivery::NotFound);
        };

        let bot = is_bot(client.user_agent.as_deref());

        // Crawlers previewing an image get metadata, not bytes
        if bot && !target.is_thumbnail && imaging::is_image(&upload.content_type) {
            let html = self.embed.embed_page(&upload).await?;
            return Ok(Delivery::EmbedPage(html));
        }

        let (path, content_type) = match (&upload.thumbnail_path, target.is_thumbnail) {
            (Some(thumb), true) => (thumb.as_str(), THUMB_CONTENT_TYPE.to_string()),
            _ => (upload.storage_path.as_str(), upload.content_type.clone()),
        };

        let Some(object) = self.storage.read(path).await? else {
            tracing::warn!(
                code = %upload.code,
                path = %path,
                "Upload record points at a missing object"
            );
            return Ok(Delivery::NotFound);
        };

        if !bot {
            self.analytics.record_view(upload.id.clone(), client.clone());
        }

        Ok(Delivery::Stream {
            content_type,
            object,
        })
    }
}
