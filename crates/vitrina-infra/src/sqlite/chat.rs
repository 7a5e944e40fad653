//! SQLite chat repository implementation.
//!
//! Implements `ChatRepository` from `vitrina-core` using sqlx with split
//! read/write pools: raw queries, private Row structs, reads on the
//! reader pool, writes on the single-connection writer pool. Message
//! `seq` is assigned inside the INSERT on the writer, which serializes
//! numbering per session.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::Row;
use uuid::Uuid;

use vitrina_core::chat::ChatRepository;
use vitrina_types::chat::{ChatMessage, ChatSession};
use vitrina_types::error::RepositoryError;
use vitrina_types::user::User;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ChatRepository`.
pub struct SqliteChatRepository {
    pool: DatabasePool,
}

impl SqliteChatRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct UserRow {
    id: String,
    external_id: String,
    created_at: String,
    updated_at: String,
}

impl UserRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            external_id: row.try_get("external_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_user(self) -> Result<User, RepositoryError> {
        Ok(User {
            id: parse_uuid(&self.id, "user id")?,
            external_id: self.external_id,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct SessionRow {
    id: String,
    user_id: String,
    title: Option<String>,
    is_active: i64,
    state: String,
    created_at: String,
    updated_at: String,
}

impl SessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            title: row.try_get("title")?,
            is_active: row.try_get("is_active")?,
            state: row.try_get("state")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_session(self) -> Result<ChatSession, RepositoryError> {
        let state: Value = serde_json::from_str(&self.state)
            .map_err(|e| RepositoryError::Query(format!("invalid session state: {e}")))?;
        Ok(ChatSession {
            id: parse_uuid(&self.id, "session id")?,
            user_id: parse_uuid(&self.user_id, "user_id")?,
            title: self.title,
            is_active: self.is_active != 0,
            state,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct MessageRow {
    id: String,
    session_id: String,
    seq: i64,
    role: String,
    content: String,
    content_type: String,
    tool_calls: Option<String>,
    blocks: Option<String>,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            seq: row.try_get("seq")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            content_type: row.try_get("content_type")?,
            tool_calls: row.try_get("tool_calls")?,
            blocks: row.try_get("blocks")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        let tool_calls = self
            .tool_calls
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("invalid tool_calls: {e}")))?;
        let blocks = self
            .blocks
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("invalid blocks: {e}")))?;
        Ok(ChatMessage {
            id: parse_uuid(&self.id, "message id")?,
            session_id: parse_uuid(&self.session_id, "session_id")?,
            seq: self.seq,
            role: self
                .role
                .parse()
                .map_err(|e: String| RepositoryError::Query(e))?,
            content: self.content,
            content_type: self
                .content_type
                .parse()
                .map_err(|e: String| RepositoryError::Query(e))?,
            tool_calls,
            blocks,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str, what: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(s).map_err(|e| RepositoryError::Query(format!("invalid {what}: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// ---------------------------------------------------------------------------
// ChatRepository implementation
// ---------------------------------------------------------------------------

impl ChatRepository for SqliteChatRepository {
    async fn get_or_create_user(&self, external_id: &str) -> Result<User, RepositoryError> {
        let candidate = User::new(external_id);
        sqlx::query(
            "INSERT OR IGNORE INTO users (id, external_id, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(candidate.id.to_string())
        .bind(&candidate.external_id)
        .bind(format_datetime(&candidate.created_at))
        .bind(format_datetime(&candidate.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        // Re-read on the writer: the row may predate this call, and the
        // reader pool could lag the insert we just made.
        let row = sqlx::query("SELECT * FROM users WHERE external_id = ?")
            .bind(external_id)
            .fetch_one(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        UserRow::from_row(&row)
            .map_err(|e| RepositoryError::Query(e.to_string()))?
            .into_user()
    }

    async fn get_session(
        &self,
        session_id: &Uuid,
    ) -> Result<Option<ChatSession>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chat_sessions WHERE id = ?")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|row| {
            SessionRow::from_row(&row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_session()
        })
        .transpose()
    }

    async fn create_session(&self, session: &ChatSession) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO chat_sessions (id, user_id, title, is_active, state, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(session.id.to_string())
        .bind(session.user_id.to_string())
        .bind(&session.title)
        .bind(if session.is_active { 1i64 } else { 0i64 })
        .bind(session.state.to_string())
        .bind(format_datetime(&session.created_at))
        .bind(format_datetime(&session.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn update_session_state(
        &self,
        session_id: &Uuid,
        update: &Map<String, Value>,
    ) -> Result<(), RepositoryError> {
        // Read-merge-write on the writer connection; the session lock in
        // vitrina-core already serializes turns per session.
        let row = sqlx::query("SELECT state FROM chat_sessions WHERE id = ?")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?
            .ok_or(RepositoryError::NotFound)?;

        let current: String = row
            .try_get("state")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let mut state: Map<String, Value> = serde_json::from_str(&current).unwrap_or_default();
        for (key, value) in update {
            state.insert(key.clone(), value.clone());
        }

        sqlx::query("UPDATE chat_sessions SET state = ?, updated_at = ? WHERE id = ?")
            .bind(Value::Object(state).to_string())
            .bind(format_datetime(&Utc::now()))
            .bind(session_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn list_sessions(&self, user_id: &Uuid) -> Result<Vec<ChatSession>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM chat_sessions WHERE user_id = ? ORDER BY updated_at DESC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            let session_row =
                SessionRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            sessions.push(session_row.into_session()?);
        }

        Ok(sessions)
    }

    async fn save_message(&self, message: &ChatMessage) -> Result<i64, RepositoryError> {
        let tool_calls = message.tool_calls.as_ref().map(|v| v.to_string());
        let blocks = message
            .blocks
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("unserializable blocks: {e}")))?;

        sqlx::query(
            r#"INSERT INTO chat_messages (id, session_id, seq, role, content, content_type, tool_calls, blocks, created_at)
               VALUES (?, ?, (SELECT COALESCE(MAX(seq), -1) + 1 FROM chat_messages WHERE session_id = ?), ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(message.id.to_string())
        .bind(message.session_id.to_string())
        .bind(message.session_id.to_string())
        .bind(message.role.to_string())
        .bind(&message.content)
        .bind(message.content_type.to_string())
        .bind(tool_calls)
        .bind(blocks)
        .bind(format_datetime(&message.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query("UPDATE chat_sessions SET updated_at = ? WHERE id = ?")
            .bind(format_datetime(&Utc::now()))
            .bind(message.session_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let row = sqlx::query("SELECT seq FROM chat_messages WHERE id = ?")
            .bind(message.id.to_string())
            .fetch_one(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        row.try_get("seq")
            .map_err(|e| RepositoryError::Query(e.to_string()))
    }

    async fn get_recent_messages(
        &self,
        session_id: &Uuid,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM chat_messages WHERE session_id = ? ORDER BY seq DESC LIMIT ?",
        )
        .bind(session_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows.iter().rev() {
            let message_row =
                MessageRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            messages.push(message_row.into_message()?);
        }

        Ok(messages)
    }

    async fn list_messages(
        &self,
        session_id: &Uuid,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM chat_messages WHERE session_id = ? ORDER BY seq ASC",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let message_row =
                MessageRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            messages.push(message_row.into_message()?);
        }

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vitrina_types::content::ContentBlock;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        DatabasePool::open(&db_path).await.unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_user_is_idempotent() {
        let repo = SqliteChatRepository::new(test_pool().await);

        let first = repo.get_or_create_user("tg-42").await.unwrap();
        let second = repo.get_or_create_user("tg-42").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.external_id, "tg-42");

        let other = repo.get_or_create_user("tg-43").await.unwrap();
        assert_ne!(first.id, other.id);
    }

    #[tokio::test]
    async fn test_session_roundtrip_and_listing() {
        let repo = SqliteChatRepository::new(test_pool().await);
        let user = repo.get_or_create_user("u1").await.unwrap();

        let s1 = ChatSession::new(user.id, Some("first".to_string()));
        let s2 = ChatSession::new(user.id, None);
        repo.create_session(&s1).await.unwrap();
        repo.create_session(&s2).await.unwrap();

        let fetched = repo.get_session(&s1.id).await.unwrap().unwrap();
        assert_eq!(fetched.title.as_deref(), Some("first"));
        assert_eq!(fetched.state, json!({}));
        assert!(fetched.is_active);

        let sessions = repo.list_sessions(&user.id).await.unwrap();
        assert_eq!(sessions.len(), 2);

        assert!(repo.get_session(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_session_state_merges_top_level() {
        let repo = SqliteChatRepository::new(test_pool().await);
        let user = repo.get_or_create_user("u1").await.unwrap();
        let session = ChatSession::new(user.id, None);
        repo.create_session(&session).await.unwrap();

        let mut first = Map::new();
        first.insert("nft_list".to_string(), json!([{"id": "nft-1"}]));
        first.insert("last_list_params".to_string(), json!({"limit": 10}));
        repo.update_session_state(&session.id, &first).await.unwrap();

        let mut second = Map::new();
        second.insert("last_list_params".to_string(), json!({"limit": 5, "skip": 10}));
        repo.update_session_state(&session.id, &second).await.unwrap();

        let state = repo.get_session(&session.id).await.unwrap().unwrap().state;
        // Untouched key survives, updated key is replaced wholesale.
        assert_eq!(state["nft_list"], json!([{"id": "nft-1"}]));
        assert_eq!(state["last_list_params"], json!({"limit": 5, "skip": 10}));
    }

    #[tokio::test]
    async fn test_update_state_unknown_session() {
        let repo = SqliteChatRepository::new(test_pool().await);
        let err = repo
            .update_session_state(&Uuid::now_v7(), &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_save_message_assigns_sequential_seq() {
        let repo = SqliteChatRepository::new(test_pool().await);
        let user = repo.get_or_create_user("u1").await.unwrap();
        let session = ChatSession::new(user.id, None);
        repo.create_session(&session).await.unwrap();

        let s0 = repo
            .save_message(&ChatMessage::user(session.id, "one"))
            .await
            .unwrap();
        let s1 = repo
            .save_message(&ChatMessage::assistant(
                session.id,
                "reply",
                vec![ContentBlock::text("reply")],
                Some(json!([{"name": "list_nfts"}])),
            ))
            .await
            .unwrap();
        let s2 = repo
            .save_message(&ChatMessage::user(session.id, "two"))
            .await
            .unwrap();
        assert_eq!((s0, s1, s2), (0, 1, 2));

        // Another session numbers independently.
        let other = ChatSession::new(user.id, None);
        repo.create_session(&other).await.unwrap();
        let s = repo
            .save_message(&ChatMessage::user(other.id, "hi"))
            .await
            .unwrap();
        assert_eq!(s, 0);
    }

    #[tokio::test]
    async fn test_message_blocks_and_tool_calls_roundtrip() {
        let repo = SqliteChatRepository::new(test_pool().await);
        let user = repo.get_or_create_user("u1").await.unwrap();
        let session = ChatSession::new(user.id, None);
        repo.create_session(&session).await.unwrap();

        let blocks = vec![
            ContentBlock::text("Here you go:"),
            ContentBlock::html_component("<div>grid</div>", "grid"),
        ];
        repo.save_message(&ChatMessage::assistant(
            session.id,
            "Here you go:",
            blocks.clone(),
            Some(json!([{"name": "list_nfts", "is_error": false}])),
        ))
        .await
        .unwrap();

        let messages = repo.list_messages(&session.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].blocks.as_ref().unwrap().len(), 2);
        assert_eq!(
            messages[0].tool_calls.as_ref().unwrap()[0]["name"],
            "list_nfts"
        );
    }

    #[tokio::test]
    async fn test_get_recent_messages_window() {
        let repo = SqliteChatRepository::new(test_pool().await);
        let user = repo.get_or_create_user("u1").await.unwrap();
        let session = ChatSession::new(user.id, None);
        repo.create_session(&session).await.unwrap();

        for i in 0..5 {
            repo.save_message(&ChatMessage::user(session.id, format!("m{i}")))
                .await
                .unwrap();
        }

        let recent = repo.get_recent_messages(&session.id, 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        // Chronological order, most recent messages only.
        assert_eq!(recent[0].content, "m2");
        assert_eq!(recent[2].content, "m4");
    }
}
