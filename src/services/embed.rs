use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::entities::{prelude::*, *};
use crate::services::delivery::parse_delivery_segment;
use crate::services::imaging::{self, THUMB_MAX_HEIGHT, THUMB_MAX_WIDTH};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

/// Size of the inline player when a video has no recorded dimensions
pub const DEFAULT_VIDEO_WIDTH: u32 = 640;
pub const DEFAULT_VIDEO_HEIGHT: u32 = 360;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OEmbedQuery {
    /// Delivery URL of the upload
    pub url: Option<String>,
    pub maxwidth: Option<u32>,
    pub maxheight: Option<u32>,
    /// Accepted for compatibility; the response is always JSON
    pub format: Option<String>,
}

#[derive(Debug, Serialize, ToSchema, PartialEq)]
pub struct OEmbedResponse {
    pub version: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    pub provider_name: String,
    pub provider_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_height: Option<u32>,
}

/// Totals across every upload of one owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OwnerStats {
    pub total_files: u64,
    pub total_storage: i64,
    pub total_views: i64,
}

/// Owner-customised text shown in embeds, placeholders already substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedText {
    pub title: String,
    pub author: Option<String>,
    pub provider: String,
    pub color: String,
}

/// Human readable byte count, e.g. `1.5 MB`.
pub fn format_size(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes.max(0) as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes.max(0), UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Substitute placeholders in an owner template.
///
/// Aggregate tokens are only replaced when `stats` is given; otherwise they are
/// left as written.
pub fn render_template(
    template: &str,
    upload: &uploads::Model,
    stats: Option<&OwnerStats>,
) -> String {
    let mut out = template
        .replace("{filename}", &upload.filename)
        .replace("{size}", &format_size(upload.size))
        .replace("{type}", &upload.content_type)
        .replace("{date}", &upload.created_at.format("%Y-%m-%d").to_string())
        .replace("{views}", &upload.views.to_string());

    if let Some(stats) = stats {
        out = out
            .replace("{total_files}", &stats.total_files.to_string())
            .replace("{total_storage}", &format_size(stats.total_storage))
            .replace("{total_views}", &stats.total_views.to_string());
    }

    out
}

pub fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn valid_color(color: &str) -> bool {
    let hex = color.strip_prefix('#').unwrap_or("");
    (hex.len() == 6 || hex.len() == 3) && hex.chars().all(|c| c.is_ascii_hexdigit())
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Resolve title, author, provider and colour for an upload.
pub fn embed_text(
    config: &AppConfig,
    upload: &uploads::Model,
    settings: Option<&user_settings::Model>,
    stats: Option<&OwnerStats>,
) -> EmbedText {
    let render = |template: Option<&str>| template.map(|t| render_template(t, upload, stats));

    let title = render(settings.and_then(|s| non_empty(s.embed_title.as_ref())))
        .unwrap_or_else(|| upload.filename.clone());
    let author = render(settings.and_then(|s| non_empty(s.embed_author.as_ref())));
    let provider = render(settings.and_then(|s| non_empty(s.embed_footer.as_ref())))
        .unwrap_or_else(|| config.site_name.clone());
    let color = settings
        .and_then(|s| s.embed_color.clone())
        .filter(|c| valid_color(c))
        .unwrap_or_else(|| config.default_embed_color.clone());

    EmbedText {
        title,
        author,
        provider,
        color,
    }
}

/// Build the oEmbed document for an upload.
pub fn build_oembed(
    config: &AppConfig,
    upload: &uploads::Model,
    text: &EmbedText,
    max_width: Option<u32>,
    max_height: Option<u32>,
) -> OEmbedResponse {
    let delivery_url = config.delivery_url(&upload.code);
    let content_type = upload.content_type.to_lowercase();

    let mut response = OEmbedResponse {
        version: "1.0".to_string(),
        kind: "link".to_string(),
        title: upload.filename.clone(),
        author_name: text.author.clone(),
        provider_name: text.provider.clone(),
        provider_url: config.public_base_url.clone(),
        url: None,
        width: None,
        height: None,
        html: None,
        thumbnail_url: None,
        thumbnail_width: None,
        thumbnail_height: None,
    };

    if imaging::is_image(&content_type) {
        response.kind = "photo".to_string();
        response.title = text.title.clone();
        response.url = Some(delivery_url);
        if let Some((w, h)) = upload.dimensions() {
            let (w, h) = imaging::fit_within(w, h, max_width, max_height);
            response.width = Some(w);
            response.height = Some(h);
        }
    } else if content_type.starts_with("video/") {
        let (w, h) = upload
            .dimensions()
            .unwrap_or((DEFAULT_VIDEO_WIDTH, DEFAULT_VIDEO_HEIGHT));
        let (w, h) = imaging::fit_within(w, h, max_width, max_height);
        response.kind = "video".to_string();
        response.title = text.title.clone();
        response.width = Some(w);
        response.height = Some(h);
        response.html = Some(format!(
            r#"<video src="{}" width="{}" height="{}" controls preload="metadata"></video>"#,
            html_escape(&delivery_url),
            w,
            h
        ));
    }

    if upload.thumbnail_path.is_some() {
        response.thumbnail_url = Some(config.thumbnail_url(&upload.code));
        response.thumbnail_width = Some(THUMB_MAX_WIDTH);
        response.thumbnail_height = Some(THUMB_MAX_HEIGHT);
    }

    response
}

/// OpenGraph / Twitter card page served to link-preview crawlers.
pub fn render_embed_page(config: &AppConfig, upload: &uploads::Model, text: &EmbedText) -> String {
    let canonical = config.delivery_url(&upload.code);
    let oembed_url = format!(
        "{}/oembed?url={}",
        config.public_base_url,
        utf8_percent_encode(&canonical, NON_ALPHANUMERIC)
    );

    let title = html_escape(&text.title);
    let canonical = html_escape(&canonical);

    let mut meta = vec![
        format!(r#"<meta property="og:title" content="{}">"#, title),
        r#"<meta property="og:type" content="website">"#.to_string(),
        format!(
            r#"<meta property="og:site_name" content="{}">"#,
            html_escape(&text.provider)
        ),
        format!(r#"<meta property="og:url" content="{}">"#, canonical),
        format!(r#"<meta property="og:image" content="{}">"#, canonical),
        format!(
            r#"<meta property="og:image:type" content="{}">"#,
            html_escape(&upload.content_type)
        ),
    ];

    if let Some((w, h)) = upload.dimensions() {
        meta.push(format!(r#"<meta property="og:image:width" content="{}">"#, w));
        meta.push(format!(r#"<meta property="og:image:height" content="{}">"#, h));
    }

    if let Some(author) = &text.author {
        meta.push(format!(
            r#"<meta property="og:description" content="{}">"#,
            html_escape(author)
        ));
    }

    meta.extend([
        r#"<meta name="twitter:card" content="summary_large_image">"#.to_string(),
        format!(r#"<meta name="twitter:title" content="{}">"#, title),
        format!(r#"<meta name="twitter:image" content="{}">"#, canonical),
        format!(
            r#"<meta name="theme-color" content="{}">"#,
            html_escape(&text.color)
        ),
        format!(
            r#"<link rel="alternate" type="application/json+oembed" href="{}" title="{}">"#,
            html_escape(&oembed_url),
            title
        ),
    ]);

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n{}\n</head>\n<body>\n<img src=\"{}\" alt=\"{}\">\n</body>\n</html>\n",
        title,
        meta.join("\n"),
        canonical,
        html_escape(&upload.filename)
    )
}

/// Builds embed metadata from stored uploads and owner settings.
pub struct EmbedService {
    db: DatabaseConnection,
    config: Arc<AppConfig>,
}

impl EmbedService {
    pub fn new(db: DatabaseConnection, config: Arc<AppConfig>) -> Self {
        Self { db, config }
    }

    async fn owner_stats(&self, user_id: &str) -> Result<OwnerStats, AppError> {
        let rows: Vec<(i64, i64)> = Uploads::find()
            .select_only()
            .column(uploads::Column::Size)
            .column(uploads::Column::Views)
            .filter(uploads::Column::UserId.eq(user_id))
            .into_tuple()
            .all(&self.db)
            .await?;

        Ok(rows.iter().fold(OwnerStats::default(), |acc, (size, views)| OwnerStats {
            total_files: acc.total_files + 1,
            total_storage: acc.total_storage + size,
            total_views: acc.total_views + views,
        }))
    }

    async fn text_for(&self, upload: &uploads::Model) -> Result<EmbedText, AppError> {
        let settings = UserSettings::find_by_id(upload.user_id.clone())
            .one(&self.db)
            .await?;

        let stats = match &settings {
            Some(s) if s.show_stats => Some(self.owner_stats(&upload.user_id).await?),
            _ => None,
        };

        Ok(embed_text(
            &self.config,
            upload,
            settings.as_ref(),
            stats.as_ref(),
        ))
    }

    pub async fn embed_page(&self, upload: &uploads::Model) -> Result<String, AppError> {
        let text = self.text_for(upload).await?;
        Ok(render_embed_page(&self.config, upload, &text))
    }

    pub async fn oembed(&self, query: &OEmbedQuery) -> Result<OEmbedResponse, AppError> {
        let raw_url = query
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AppError::BadRequest("Missing url parameter".to_string()))?;

        let url = url::Url::parse(raw_url)
            .map_err(|_| AppError::BadRequest("Malformed url parameter".to_string()))?;

        let target = url
            .path()
            .strip_prefix("/f/")
            .and_then(parse_delivery_segment)
            .ok_or_else(|| AppError::NotFound("Not a delivery URL".to_string()))?;

        let upload = Uploads::find()
            .filter(uploads::Column::Code.eq(&target.code))
            .one(&self.db)
            .await?
            .filter(|u| u.is_public)
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

        let text = self.text_for(&upload).await?;
        Ok(build_oembed(
            &self.config,
            &upload,
            &text,
            query.maxwidth,
            query.maxheight,
        ))
    }
}
