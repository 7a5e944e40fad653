//! Chat session and message types for Vitrina.
//!
//! Sessions carry a free-form JSON state bag that tools update between
//! turns (listing snapshots, pagination params, display preferences).
//! Messages are ordered by a per-session sequence number assigned at
//! insert time on the single-writer pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::content::ContentBlock;

/// Role of a persisted chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "tool" => Ok(MessageRole::Tool),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// How the `content` column of a message should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Markdown,
    BlocksJson,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Markdown => write!(f, "markdown"),
            ContentType::BlocksJson => write!(f, "blocks_json"),
        }
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" => Ok(ContentType::Markdown),
            "blocks_json" => Ok(ContentType::BlocksJson),
            other => Err(format!("invalid content type: '{other}'")),
        }
    }
}

/// A chat session between a user and the storefront assistant.
///
/// `state` is a JSON object merged (top-level keys) on every update;
/// tools write listing snapshots and pagination params into it so the
/// next turn's prompt can reference "the NFTs I just showed you".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub is_active: bool,
    pub state: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// Construct a fresh active session for a user.
    pub fn new(user_id: Uuid, title: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            user_id,
            title,
            is_active: true,
            state: serde_json::Value::Object(serde_json::Map::new()),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A single message within a chat session.
///
/// Assistant messages carry both the sanitized raw text (`content`) and
/// the structured blocks derived from it, plus tool invocation metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    /// Strictly increasing per session; assigned by the repository at insert.
    pub seq: i64,
    pub role: MessageRole,
    pub content: String,
    pub content_type: ContentType,
    /// Tool invocation metadata (assistant messages only).
    pub tool_calls: Option<serde_json::Value>,
    /// Structured content blocks (assistant messages only).
    pub blocks: Option<Vec<ContentBlock>>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Construct an unsaved user message. `seq` is assigned at insert.
    pub fn user(session_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            session_id,
            seq: 0,
            role: MessageRole::User,
            content: content.into(),
            content_type: ContentType::Markdown,
            tool_calls: None,
            blocks: None,
            created_at: Utc::now(),
        }
    }

    /// Construct an unsaved assistant message with derived blocks.
    pub fn assistant(
        session_id: Uuid,
        content: impl Into<String>,
        blocks: Vec<ContentBlock>,
        tool_calls: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            session_id,
            seq: 0,
            role: MessageRole::Assistant,
            content: content.into(),
            content_type: ContentType::BlocksJson,
            tool_calls,
            blocks: Some(blocks),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_role_roundtrip() {
        for role in [MessageRole::User, MessageRole::Assistant, MessageRole::Tool] {
            let s = role.to_string();
            let parsed: MessageRole = s.parse().unwrap();
            assert_eq!(role, parsed);
        }
    }

    #[test]
    fn test_content_type_roundtrip() {
        for ct in [ContentType::Markdown, ContentType::BlocksJson] {
            let s = ct.to_string();
            let parsed: ContentType = s.parse().unwrap();
            assert_eq!(ct, parsed);
        }
    }

    #[test]
    fn test_new_session_state_is_empty_object() {
        let session = ChatSession::new(Uuid::now_v7(), None);
        assert!(session.is_active);
        assert_eq!(session.state, serde_json::json!({}));
    }

    #[test]
    fn test_message_role_serde() {
        let json = serde_json::to_string(&MessageRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }
}
