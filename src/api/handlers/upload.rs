use crate::AppState;
use crate::api::error::AppError;
use crate::services::upload_service::{UploadOutcome, UploadRequest};
use crate::utils::auth::Claims;
use axum::{
    Extension, Json,
    extract::{Multipart, State},
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub id: String,
    pub code: String,
    pub url: String,
    pub delete_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub direct_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i32>,
}

impl From<UploadOutcome> for UploadResponse {
    fn from(outcome: UploadOutcome) -> Self {
        Self {
            id: outcome.upload.id,
            code: outcome.upload.code,
            url: outcome.url,
            delete_url: outcome.delete_url,
            thumbnail_url: outcome.thumbnail_url,
            direct_url: outcome.direct_url,
            width: outcome.upload.width,
            height: outcome.upload.height,
        }
    }
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = Multipart, description = "File upload in a `file` field"),
    responses(
        (status = 200, description = "File uploaded successfully", body = UploadResponse),
        (status = 400, description = "No file provided"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Account not approved"),
        (status = 413, description = "File or storage limit exceeded")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "files"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut request: Option<UploadRequest> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("unnamed").to_string();
        let content_type = field.content_type().map(|s| s.to_string());
        let data = field.bytes().await.map_err(multipart_error)?;

        request = Some(UploadRequest {
            user_id: claims.sub.clone(),
            filename,
            content_type,
            data,
        });
        break;
    }

    let request = request.ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;
    let outcome = state.upload_service.ingest(request).await?;

    Ok(Json(outcome.into()))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    let err_msg = e.to_string();
    if err_msg.contains("length limit exceeded") {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(err_msg)
    }
}
