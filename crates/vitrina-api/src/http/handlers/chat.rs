//! Chat turn HTTP handler.
//!
//! POST /api/v1/chat - run one conversational turn.

use std::time::Instant;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vitrina_types::content::ContentBlock;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

const MAX_MESSAGE_CHARS: usize = 4_000;

/// Request body for a chat turn.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Caller-assigned stable user identifier.
    pub user_id: String,
    /// Omit to start a new session.
    #[serde(default)]
    pub session_id: Option<Uuid>,
    pub message: String,
}

/// Response payload for a chat turn.
#[derive(Debug, Serialize)]
pub struct ChatTurnResponse {
    pub session_id: Uuid,
    pub blocks: Vec<ContentBlock>,
}

/// POST /api/v1/chat - run one turn and return the structured reply.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ApiResponse<ChatTurnResponse>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let message = request.message.trim().to_string();
    if message.is_empty() {
        return Err(AppError::Validation("message must not be empty".to_string()));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::Validation(format!(
            "message exceeds {MAX_MESSAGE_CHARS} characters"
        )));
    }
    if request.user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id must not be empty".to_string()));
    }

    // Run the turn on a detached task so persistence completes even if
    // the client disconnects mid-turn.
    let orchestrator = state.orchestrator.clone();
    let output = tokio::spawn(async move {
        orchestrator
            .handle_turn(&request.user_id, request.session_id, &message)
            .await
    })
    .await
    .map_err(|e| AppError::Internal(format!("turn task panicked: {e}")))??;

    let elapsed = start.elapsed().as_millis() as u64;
    let response = ChatTurnResponse {
        session_id: output.session_id,
        blocks: output.blocks,
    };
    Ok(Json(ApiResponse::success(response, request_id, elapsed)))
}
