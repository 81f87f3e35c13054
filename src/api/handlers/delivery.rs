use crate::AppState;
use crate::api::error::AppError;
use crate::services::analytics::ClientInfo;
use crate::services::delivery::{Delivery, IMMUTABLE_CACHE_CONTROL};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
};

#[utoipa::path(
    get,
    path = "/f/{segment}",
    params(
        ("segment" = String, Path, description = "Short code, optionally prefixed with thumb_ and suffixed with an extension")
    ),
    responses(
        (status = 200, description = "Raw file bytes, or an embed page for link-preview crawlers"),
        (status = 404, description = "Unknown or private file")
    ),
    tag = "delivery"
)]
pub async fn deliver_file(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let client = ClientInfo::from_headers(&headers);

    match state.delivery.deliver(&segment, &client).await? {
        Delivery::NotFound => Ok(StatusCode::NOT_FOUND.into_response()),
        Delivery::EmbedPage(html) => Ok(Html(html).into_response()),
        Delivery::Stream {
            content_type,
            object,
        } => {
            let mut builder = Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CACHE_CONTROL, IMMUTABLE_CACHE_CONTROL);

            if let Some(size) = object.size {
                builder = builder.header(header::CONTENT_LENGTH, size);
            }

            builder
                .body(Body::from_stream(object.body))
                .map_err(|e| AppError::Internal(e.to_string()))
        }
    }
}
