//! HTTP route handlers.

pub mod sessions;
pub mod ws;

use crate::state::AppState;
use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn healthz() -> &'static str {
    "ok"
}

/// Build the full application router.
pub fn router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/sessions", post(sessions::create))
        .route("/sessions/{id}", get(sessions::get))
        .route("/sessions/{id}/start", post(sessions::start))
        .route("/sessions/{id}/results", get(sessions::results))
        .route("/sessions/{id}/highlights", get(sessions::highlights))
        .route("/health", get(health));

    let ws_routes = Router::new().route("/sessions/{id}", get(ws::upgrade));

    Router::new()
        .nest("/api", api_routes)
        .nest("/ws", ws_routes)
        .route("/healthz", get(healthz))
        .nest_service("/static", ServeDir::new(&state.config.static_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
