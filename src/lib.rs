pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::analytics::AnalyticsRecorder;
use crate::services::delivery::DeliveryService;
use crate::services::embed::EmbedService;
use crate::services::file_service::FileService;
use crate::services::link_service::LinkService;
use crate::services::storage::ObjectStore;
use crate::services::upload_service::UploadService;
use axum::{
    Router,
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Slack on top of the file limit for multipart framing
const MULTIPART_OVERHEAD: usize = 10 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::upload::upload_file,
        api::handlers::files::delete_file,
        api::handlers::delivery::deliver_file,
        api::handlers::oembed::oembed,
        api::handlers::links::create_link,
        api::handlers::links::follow_link,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::upload::UploadResponse,
            api::handlers::links::CreateLinkRequest,
            api::handlers::links::LinkResponse,
            api::handlers::health::HealthResponse,
            services::embed::OEmbedResponse,
        )
    ),
    tags(
        (name = "files", description = "Upload and deletion endpoints"),
        (name = "delivery", description = "Public file delivery and embeds"),
        (name = "links", description = "Link shortening")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub storage: Arc<dyn ObjectStore>,
    pub config: Arc<AppConfig>,
    pub analytics: AnalyticsRecorder,
    pub upload_service: Arc<UploadService>,
    pub file_service: Arc<FileService>,
    pub embed: Arc<EmbedService>,
    pub delivery: Arc<DeliveryService>,
    pub link_service: Arc<LinkService>,
}

impl AppState {
    /// Wire every service against one database and object store.
    pub fn new(db: DatabaseConnection, storage: Arc<dyn ObjectStore>, config: AppConfig) -> Self {
        let config = Arc::new(config);
        let analytics = AnalyticsRecorder::new(db.clone());
        let embed = Arc::new(EmbedService::new(db.clone(), config.clone()));

        Self {
            upload_service: Arc::new(UploadService::new(
                db.clone(),
                storage.clone(),
                config.clone(),
            )),
            file_service: Arc::new(FileService::new(db.clone(), storage.clone())),
            delivery: Arc::new(DeliveryService::new(
                db.clone(),
                storage.clone(),
                embed.clone(),
                analytics.clone(),
            )),
            link_service: Arc::new(LinkService::new(
                db.clone(),
                config.clone(),
                analytics.clone(),
            )),
            embed,
            analytics,
            config,
            storage,
            db,
        }
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    let allow_origin = if config.allowed_origins.iter().any(|o| o == "*") || origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn create_app(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.default_max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/f/:segment", get(api::handlers::delivery::deliver_file))
        .route("/oembed", get(api::handlers::oembed::oembed))
        .route("/s/:code", get(api::handlers::links::follow_link))
        .route(
            "/upload",
            post(api::handlers::upload::upload_file)
                .layer(axum::extract::DefaultBodyLimit::max(body_limit))
                .layer(from_fn_with_state(
                    state.clone(),
                    api::middleware::auth::auth_middleware,
                )),
        )
        .route(
            "/files/:id",
            delete(api::handlers::files::delete_file).layer(from_fn_with_state(
                state.clone(),
                api::middleware::auth::auth_middleware,
            )),
        )
        .route(
            "/links",
            post(api::handlers::links::create_link).layer(from_fn_with_state(
                state.clone(),
                api::middleware::auth::auth_middleware,
            )),
        )
        .layer(cors_layer(&state.config))
        .with_state(state)
}
