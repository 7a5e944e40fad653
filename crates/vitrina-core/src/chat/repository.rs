//! Chat persistence port.

use std::future::Future;

use serde_json::{Map, Value};
use uuid::Uuid;

use vitrina_types::chat::{ChatMessage, ChatSession};
use vitrina_types::error::RepositoryError;
use vitrina_types::user::User;

/// Persistence operations for users, sessions, and messages.
///
/// Implemented by the SQLite layer in vitrina-infra; the orchestrator
/// only sees this trait.
pub trait ChatRepository: Send + Sync {
    /// Resolve an external user id to a [`User`], creating one on first contact.
    fn get_or_create_user(
        &self,
        external_id: &str,
    ) -> impl Future<Output = Result<User, RepositoryError>> + Send;

    fn get_session(
        &self,
        session_id: &Uuid,
    ) -> impl Future<Output = Result<Option<ChatSession>, RepositoryError>> + Send;

    fn create_session(
        &self,
        session: &ChatSession,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Merge `update` into the session state at the top level (incoming
    /// keys overwrite, existing keys otherwise survive).
    fn update_session_state(
        &self,
        session_id: &Uuid,
        update: &Map<String, Value>,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// All sessions for a user, most recently updated first.
    fn list_sessions(
        &self,
        user_id: &Uuid,
    ) -> impl Future<Output = Result<Vec<ChatSession>, RepositoryError>> + Send;

    /// Persist a message, assigning the next per-session `seq`. Returns
    /// the assigned seq.
    fn save_message(
        &self,
        message: &ChatMessage,
    ) -> impl Future<Output = Result<i64, RepositoryError>> + Send;

    /// The most recent `limit` messages of a session, chronological order.
    fn get_recent_messages(
        &self,
        session_id: &Uuid,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;

    /// Every message of a session, chronological order.
    fn list_messages(
        &self,
        session_id: &Uuid,
    ) -> impl Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;
}
