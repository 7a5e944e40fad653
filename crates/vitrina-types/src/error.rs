use thiserror::Error;

use crate::llm::LlmError;

/// Errors from repository operations (used by trait definitions in vitrina-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Turn-level errors surfaced by the chat orchestrator.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("session '{0}' not found or not owned by this user")]
    SessionMismatch(String),

    #[error("model error: {0}")]
    Model(#[from] LlmError),

    #[error("turn timed out after {0}s")]
    TurnTimeout(u64),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Errors from tool dispatch. These are recovered inside the agent loop
/// (fed back to the model as error tool results), never surfaced to the
/// HTTP caller.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("tool '{tool}' failed: {reason}")]
    Execution { tool: String, reason: String },

    #[error("tool '{tool}' timed out after {timeout_secs}s")]
    Timeout { tool: String, timeout_secs: u64 },

    #[error("unknown tool '{0}'")]
    Unknown(String),
}
