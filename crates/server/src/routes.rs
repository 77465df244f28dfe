use axum::{http::StatusCode, routing::get, Json, Router};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use utoipa::OpenApi;

use common::types::Health;
use service::StorageService;

use crate::openapi::ApiDoc;

pub mod storage;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub storage: StorageService,
}

#[utoipa::path(get, path = "/health", tag = "health", responses((status = 200, description = "OK", body = crate::openapi::HealthResponse)))]
pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn metrics() -> (StatusCode, String) {
    match service::metrics::encode_metrics() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the full application router: health, metrics, docs and the storage
/// surface mounted at `base_path` (e.g. `/storage`).
pub fn build_router(state: AppState, base_path: &str, cors: CorsLayer) -> Router {
    let root = format!("{base_path}/");
    let by_key = format!("{base_path}/:key");

    let storage_routes = Router::new()
        .route(
            base_path,
            get(storage::get_all).post(storage::set_all).delete(storage::delete_all),
        )
        .route(
            &root,
            get(storage::get_all).post(storage::set_all).delete(storage::delete_all),
        )
        .route(
            &by_key,
            get(storage::get_key).post(storage::set_key).delete(storage::delete_key),
        );

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api-docs/openapi.json", get(openapi_json))
        .merge(storage_routes)
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO).include_headers(false))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO).include_headers(false))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}
