//! Cross-session memory fact types.
//!
//! Facts are keyed per user by (memory_type, key) and merged
//! last-write-wins. Keys are a small well-known vocabulary; the
//! constants in [`keys`] are the ones the heuristics and the assistant
//! directives produce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Category of a memory fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// Identity details: display name, timezone, language.
    Personal,
    /// Display and formatting preferences.
    Preference,
    /// What the user is trying to do (browse, buy, research).
    Intent,
    /// Observed behavior patterns.
    Behavior,
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryType::Personal => write!(f, "personal"),
            MemoryType::Preference => write!(f, "preference"),
            MemoryType::Intent => write!(f, "intent"),
            MemoryType::Behavior => write!(f, "behavior"),
        }
    }
}

impl FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "personal" => Ok(MemoryType::Personal),
            "preference" => Ok(MemoryType::Preference),
            "intent" => Ok(MemoryType::Intent),
            "behavior" => Ok(MemoryType::Behavior),
            other => Err(format!("invalid memory type: '{other}'")),
        }
    }
}

/// Where a fact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemorySource {
    /// Derived from the user's own message by heuristics.
    Conversation,
    /// Emitted by the assistant via a store directive.
    Assistant,
}

impl fmt::Display for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemorySource::Conversation => write!(f, "conversation"),
            MemorySource::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for MemorySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conversation" => Ok(MemorySource::Conversation),
            "assistant" => Ok(MemorySource::Assistant),
            other => Err(format!("invalid memory source: '{other}'")),
        }
    }
}

/// A single remembered fact about a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryFact {
    pub id: Uuid,
    pub user_id: Uuid,
    pub memory_type: MemoryType,
    pub key: String,
    pub value: String,
    pub confidence: f64,
    pub source: MemorySource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryFact {
    /// Construct a fresh fact with full confidence.
    pub fn new(
        user_id: Uuid,
        memory_type: MemoryType,
        key: impl Into<String>,
        value: impl Into<String>,
        source: MemorySource,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            user_id,
            memory_type,
            key: key.into(),
            value: value.into(),
            confidence: 1.0,
            source,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Well-known memory keys.
pub mod keys {
    pub const DISPLAY_NAME: &str = "display_name";
    pub const TIMEZONE: &str = "timezone";
    pub const LANGUAGE: &str = "language";
    pub const PREFERRED_VIEW: &str = "preferred_view";
    pub const DETAIL_LEVEL: &str = "detail_level";
    pub const RESPONSE_FORMAT: &str = "response_format";
    pub const STYLE_PREFERENCE: &str = "style_preference";
    pub const PRIMARY_INTENT: &str = "primary_intent";
    pub const INTEREST_COLLECTIONS: &str = "interest_collections";
    pub const PRICE_RANGE_INTEREST: &str = "price_range_interest";
}
