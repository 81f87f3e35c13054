use crate::AppState;
use crate::api::error::AppError;
use crate::utils::auth::Claims;
use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
};

#[utoipa::path(
    delete,
    path = "/files/{id}",
    params(
        ("id" = String, Path, description = "Upload ID")
    ),
    responses(
        (status = 204, description = "File deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "File not found")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "files"
)]
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.file_service.delete_upload(&claims.sub, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
