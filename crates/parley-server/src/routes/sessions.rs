//! Session management routes.

use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use parley_core::{CreateSessionOptions, ParleyError};
use parley_types::{Channel, Highlight, SessionDetail, SessionMeta, TaskResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

type ApiError = (StatusCode, String);

fn map_error(e: ParleyError) -> ApiError {
    match e {
        ParleyError::SessionNotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        e if e.is_validation() => (StatusCode::BAD_REQUEST, e.to_string()),
        e => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn not_found() -> ApiError {
    (StatusCode::NOT_FOUND, "Session not found".to_string())
}

fn default_org() -> String {
    "sga".to_string()
}

fn default_role() -> String {
    "swe".to_string()
}

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default = "default_org")]
    pub org: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(flatten)]
    pub meta: SessionMeta,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
    pub channels: Vec<Channel>,
    pub ws_url: String,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    let org = req.org.clone();
    let role = req.role.clone();
    let created = state
        .session_manager
        .create_session(CreateSessionOptions {
            org: req.org,
            role: req.role,
            meta: req.meta,
        })
        .await
        .map_err(|e| {
            warn!(target: "parley::api", "Create session for {}/{} failed: {}", org, role, e);
            map_error(e)
        })?;

    info!(target: "parley::api", "POST /api/sessions -> {}", created.session_id);
    Ok(Json(CreateSessionResponse {
        session_id: created.session_id,
        channels: created.channels,
        ws_url: format!("/ws/sessions/{}", created.session_id),
    }))
}

#[derive(Serialize)]
pub struct StartResponse {
    pub ok: bool,
}

pub async fn start(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<StartResponse>, ApiError> {
    state.session_manager.start_session(id).await.map_err(map_error)?;
    Ok(Json(StartResponse { ok: true }))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionDetail>, ApiError> {
    let detail = state.session_manager.detail(id).await.ok_or_else(not_found)?;
    Ok(Json(detail))
}

pub async fn results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TaskResult>>, ApiError> {
    let results = state.session_manager.results(id).await.ok_or_else(not_found)?;
    Ok(Json(results))
}

pub async fn highlights(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Highlight>>, ApiError> {
    let highlights = state.session_manager.highlights(id).await.ok_or_else(not_found)?;
    Ok(Json(highlights))
}
