//! Session and message listing HTTP handlers.
//!
//! Endpoints:
//! - GET /api/v1/users/{external_id}/sessions - List a user's sessions
//! - GET /api/v1/sessions/{id}/messages       - Full message history

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use uuid::Uuid;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Parse a UUID from a path parameter, returning a 400 error on invalid format.
fn parse_uuid(s: &str) -> Result<Uuid, AppError> {
    s.parse::<Uuid>()
        .map_err(|_| AppError::Validation(format!("Invalid UUID: {s}")))
}

/// GET /api/v1/users/{external_id}/sessions - List sessions, most recent first.
pub async fn list_sessions(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<serde_json::Value>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sessions = state.orchestrator.list_sessions(&external_id).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let sessions_json: Vec<serde_json::Value> = sessions
        .iter()
        .map(|s| {
            serde_json::json!({
                "id": s.id,
                "title": s.title,
                "is_active": s.is_active,
                "created_at": s.created_at,
                "updated_at": s.updated_at,
            })
        })
        .collect();

    Ok(Json(ApiResponse::success(sessions_json, request_id, elapsed)))
}

/// GET /api/v1/sessions/{id}/messages - Full history in seq order.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<serde_json::Value>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sid = parse_uuid(&session_id)?;
    let messages = state.orchestrator.session_messages(&sid).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let messages_json: Vec<serde_json::Value> = messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "id": m.id,
                "seq": m.seq,
                "role": m.role,
                "content": m.content,
                "content_type": m.content_type,
                "blocks": m.blocks,
                "created_at": m.created_at,
            })
        })
        .collect();

    Ok(Json(ApiResponse::success(messages_json, request_id, elapsed)))
}
