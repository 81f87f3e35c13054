use crate::AppState;
use crate::api::error::AppError;
use crate::services::analytics::ClientInfo;
use crate::utils::auth::Claims;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct CreateLinkRequest {
    /// Absolute http(s) URL to redirect to
    pub url: String,
}

#[derive(Serialize, ToSchema)]
pub struct LinkResponse {
    pub id: String,
    pub code: String,
    pub short_url: String,
    pub target_url: String,
}

#[utoipa::path(
    post,
    path = "/links",
    request_body = CreateLinkRequest,
    responses(
        (status = 200, description = "Short link created", body = LinkResponse),
        (status = 400, description = "Target is not an http(s) URL"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "links"
)]
pub async fn create_link(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateLinkRequest>,
) -> Result<Json<LinkResponse>, AppError> {
    let link = state.link_service.create(&claims.sub, &req.url).await?;

    Ok(Json(LinkResponse {
        short_url: state.config.short_link_url(&link.code),
        id: link.id,
        code: link.code,
        target_url: link.target_url,
    }))
}

#[utoipa::path(
    get,
    path = "/s/{code}",
    params(
        ("code" = String, Path, description = "Short link code")
    ),
    responses(
        (status = 302, description = "Redirect to the target URL"),
        (status = 404, description = "Unknown code")
    ),
    tag = "links"
)]
pub async fn follow_link(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let client = ClientInfo::from_headers(&headers);

    match state.link_service.resolve(&code, &client).await? {
        Some(target) => Ok((StatusCode::FOUND, [(header::LOCATION, target)]).into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}
