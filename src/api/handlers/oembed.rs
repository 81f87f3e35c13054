use crate::AppState;
use crate::api::error::AppError;
use crate::services::embed::{OEmbedQuery, OEmbedResponse};
use axum::{
    Json,
    extract::{Query, State},
};

#[utoipa::path(
    get,
    path = "/oembed",
    params(OEmbedQuery),
    responses(
        (status = 200, description = "oEmbed document", body = OEmbedResponse),
        (status = 400, description = "Missing or malformed url"),
        (status = 404, description = "URL does not point at a public file")
    ),
    tag = "delivery"
)]
pub async fn oembed(
    State(state): State<AppState>,
    Query(query): Query<OEmbedQuery>,
) -> Result<Json<OEmbedResponse>, AppError> {
    let doc = state.embed.oembed(&query).await?;
    Ok(Json(doc))
}
