//! Memory merge policy.
//!
//! Decides what gets remembered after each turn, from two inputs: the
//! user's own message (heuristics) and the assistant's store directives
//! (extracted from the raw response before parsing). The rules:
//!
//! - A "forget my details" request deletes personal facts and stops.
//! - Personal details are stored freely (name patterns in the message,
//!   STORE_PERSONAL directives from the assistant).
//! - Preferences and intents are stored only when the user explicitly
//!   asked to remember, or when a STORE_PREFERENCE directive arrived.
//!
//! All writes are last-write-wins upserts keyed on (user, type, key).

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Map;
use tracing::{debug, info};
use uuid::Uuid;

use vitrina_types::error::RepositoryError;
use vitrina_types::memory::{MemoryFact, MemorySource, MemoryType, keys};

use super::store::MemoryRepository;

static DONT_REMEMBER_PERSONAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(don't remember|do not remember|forget|don't store|do not store|remove|delete)\s+(my\s+)?(name|details?|personal|info|information)\b",
    )
    .unwrap()
});

static REMEMBER_ASK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(remember|save|store|keep|share|sharing)\s+(that\s+)?(my\s+)?(this\s+)?(preference|preferences|choice|choices|that\s+i\s+prefer|that\s+i\s+like|i\s+prefer|i\s+like)\b|\b(this\s+is|that'?s?)\s+(my\s+)?(preference|choice)\b|\b(want\s+to|would\s+like\s+to|please)\s+(remember|save|store|keep)\b",
    )
    .unwrap()
});

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:you can call me|call me|my name is|i'?m|i am|this is)\s+([a-zA-Z][a-zA-Z0-9_ ]{0,50})")
        .unwrap()
});

static COLLECTION_INTEREST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:interested in|collect)\s+(?:the\s+)?(?:collections?\s+)?([a-zA-Z0-9 ,]+?)(?:\s+collection)?[.!,\s]*$",
    )
    .unwrap()
});

static PRICE_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:under|below|max|within)\s+(\d+(?:\.\d+)?)\s*ETH").unwrap());

/// Applies the memory merge policy after each turn.
pub struct MemoryManager;

impl MemoryManager {
    /// Merge heuristics from the user message with assistant directives
    /// into the repository. Never fails the turn on a partial write;
    /// repository errors propagate only from the first failing upsert.
    pub async fn extract_and_merge<M: MemoryRepository>(
        repo: &M,
        user_id: &Uuid,
        user_message: &str,
        personal_directives: &Map<String, serde_json::Value>,
        preference_directives: &Map<String, serde_json::Value>,
    ) -> Result<(), RepositoryError> {
        let msg = user_message.trim();
        let msg_lower = msg.to_lowercase();

        if DONT_REMEMBER_PERSONAL.is_match(msg) {
            let deleted = repo
                .delete_facts_by_type(user_id, MemoryType::Personal)
                .await?;
            info!(%user_id, deleted, "Forgot personal details on user request");
            return Ok(());
        }

        // Personal details: message heuristics plus assistant directives.
        if let Some(capture) = NAME_PATTERN.captures(msg) {
            let name = capture[1].trim().to_string();
            let lowered = name.to_lowercase();
            if name.len() <= 50 && !matches!(lowered.as_str(), "me" | "i" | "a" | "the") {
                upsert(repo, user_id, MemoryType::Personal, keys::DISPLAY_NAME, &name).await?;
            }
        }
        for (key, max_len) in [
            (keys::DISPLAY_NAME, 100),
            (keys::TIMEZONE, 100),
            (keys::LANGUAGE, 50),
        ] {
            if let Some(value) = directive_str(personal_directives, key) {
                let clamped: String = value.chars().take(max_len).collect();
                upsert_from_assistant(repo, user_id, MemoryType::Personal, key, &clamped).await?;
            }
        }

        // Preferences and intents are gated: explicit ask or directive.
        let asked_to_remember = REMEMBER_ASK.is_match(msg);
        if !asked_to_remember && preference_directives.is_empty() {
            debug!(%user_id, "No preference consent this turn, skipping");
            return Ok(());
        }

        if let Some(view) = directive_str(preference_directives, keys::PREFERRED_VIEW)
            .filter(|v| matches!(v.to_lowercase().as_str(), "grid" | "table"))
        {
            upsert_from_assistant(
                repo,
                user_id,
                MemoryType::Preference,
                keys::PREFERRED_VIEW,
                &view.to_lowercase(),
            )
            .await?;
        } else if msg_lower.contains("table")
            || msg_lower.contains("list view")
            || msg_lower.contains("list format")
        {
            upsert(repo, user_id, MemoryType::Preference, keys::PREFERRED_VIEW, "table").await?;
        } else if msg_lower.contains("grid") || msg_lower.contains("card view") {
            upsert(repo, user_id, MemoryType::Preference, keys::PREFERRED_VIEW, "grid").await?;
        }

        if let Some(level) = directive_str(preference_directives, keys::DETAIL_LEVEL)
            .filter(|v| matches!(v.to_lowercase().as_str(), "minimal" | "standard" | "detailed" | "full"))
        {
            upsert_from_assistant(
                repo,
                user_id,
                MemoryType::Preference,
                keys::DETAIL_LEVEL,
                &level.to_lowercase(),
            )
            .await?;
        } else if msg_lower.contains("more detail")
            || msg_lower.contains("full info")
            || msg_lower.contains("detailed")
        {
            upsert(repo, user_id, MemoryType::Preference, keys::DETAIL_LEVEL, "detailed").await?;
        } else if msg_lower.contains("brief")
            || msg_lower.contains("quick")
            || msg_lower.contains("minimal")
            || msg_lower.contains("less detail")
        {
            upsert(repo, user_id, MemoryType::Preference, keys::DETAIL_LEVEL, "minimal").await?;
        }

        if let Some(format) = directive_str(preference_directives, keys::RESPONSE_FORMAT)
            .filter(|v| matches!(v.to_lowercase().as_str(), "concise" | "balanced" | "detailed"))
        {
            upsert_from_assistant(
                repo,
                user_id,
                MemoryType::Preference,
                keys::RESPONSE_FORMAT,
                &format.to_lowercase(),
            )
            .await?;
        } else if msg_lower.contains("short") || msg_lower.contains("concise") {
            upsert(repo, user_id, MemoryType::Preference, keys::RESPONSE_FORMAT, "concise").await?;
        } else if msg_lower.contains("balanced") {
            upsert(repo, user_id, MemoryType::Preference, keys::RESPONSE_FORMAT, "balanced").await?;
        }

        if msg_lower.contains("minimal")
            && (msg_lower.contains("style") || msg_lower.contains("look"))
        {
            upsert(repo, user_id, MemoryType::Preference, keys::STYLE_PREFERENCE, "minimal").await?;
        } else if msg_lower.contains("rich") || msg_lower.contains("more style") {
            upsert(repo, user_id, MemoryType::Preference, keys::STYLE_PREFERENCE, "rich").await?;
        }

        if msg_lower.contains("browsing") || msg_lower.contains("looking around") {
            upsert(repo, user_id, MemoryType::Intent, keys::PRIMARY_INTENT, "browsing").await?;
        } else if msg_lower.contains("buy") || msg_lower.contains("buying") {
            upsert(repo, user_id, MemoryType::Intent, keys::PRIMARY_INTENT, "buying").await?;
        } else if msg_lower.contains("collector") || msg_lower.contains("collecting") {
            upsert(repo, user_id, MemoryType::Intent, keys::PRIMARY_INTENT, "collecting").await?;
        } else if msg_lower.contains("research") || msg_lower.contains("comparing") {
            upsert(repo, user_id, MemoryType::Intent, keys::PRIMARY_INTENT, "research").await?;
        }

        if let Some(capture) = COLLECTION_INTEREST.captures(msg) {
            let interest = capture[1].trim().to_string();
            if interest.len() <= 200 {
                upsert(repo, user_id, MemoryType::Intent, keys::INTEREST_COLLECTIONS, &interest)
                    .await?;
            }
        }
        if let Some(capture) = PRICE_RANGE.captures(msg) {
            let value = format!("under {} ETH", &capture[1]);
            upsert(repo, user_id, MemoryType::Intent, keys::PRICE_RANGE_INTEREST, &value).await?;
        }

        Ok(())
    }
}

fn directive_str(map: &Map<String, serde_json::Value>, key: &str) -> Option<String> {
    map.get(key).and_then(|v| match v {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

async fn upsert<M: MemoryRepository>(
    repo: &M,
    user_id: &Uuid,
    memory_type: MemoryType,
    key: &str,
    value: &str,
) -> Result<(), RepositoryError> {
    repo.upsert_fact(&MemoryFact::new(
        *user_id,
        memory_type,
        key,
        value,
        MemorySource::Conversation,
    ))
    .await
}

async fn upsert_from_assistant<M: MemoryRepository>(
    repo: &M,
    user_id: &Uuid,
    memory_type: MemoryType,
    key: &str,
    value: &str,
) -> Result<(), RepositoryError> {
    repo.upsert_fact(&MemoryFact::new(
        *user_id,
        memory_type,
        key,
        value,
        MemorySource::Assistant,
    ))
    .await
}
