pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::metrics;
use crate::state::AppState;
use crate::workspace::handlers;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Workspace (edit session) API
        .route(
            "/api/v1/workspace/interpret",
            post(handlers::handle_interpret),
        )
        .route(
            "/api/v1/workspace/:token",
            get(handlers::handle_get).delete(handlers::handle_delete),
        )
        .route(
            "/api/v1/workspace/:token/expand",
            post(handlers::handle_expand),
        )
        .route(
            "/api/v1/workspace/:token/keywords",
            post(handlers::handle_merge_keywords),
        )
        .route(
            "/api/v1/workspace/:token/draft",
            post(handlers::handle_draft),
        )
        .route("/api/v1/workspace/:token/save", post(handlers::handle_save))
        // Public prompt detail view
        .route(
            "/api/v1/prompts/:id",
            get(metrics::handlers::handle_prompt_detail),
        )
        .route(
            "/api/v1/prompts/:id/versions",
            get(metrics::handlers::handle_prompt_versions),
        )
        .route(
            "/api/v1/prompts/:id/like",
            post(metrics::handlers::handle_prompt_like),
        )
        .route(
            "/api/v1/prompts/:id/download",
            post(metrics::handlers::handle_prompt_download),
        )
        .with_state(state)
}
