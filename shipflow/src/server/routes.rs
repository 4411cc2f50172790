//! Router assembly.

use super::handlers;
use super::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builds the service router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/generate-preview", post(handlers::generate_preview))
        .route("/config", get(handlers::get_config).put(handlers::update_config))
        .route("/deploy", post(handlers::deploy))
        .route("/files", get(handlers::list_files))
        .route("/engine-status", get(handlers::engine_status))
        .route("/commit", post(handlers::commit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
