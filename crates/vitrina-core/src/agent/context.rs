//! Prompt context assembly.
//!
//! Pure functions over already-loaded data: memory facts, session
//! state, and recent history go in; a system prompt and a replayable
//! message window come out. No IO here, which keeps this testable
//! without a database or provider.

use vitrina_types::chat::{ChatMessage, MessageRole};
use vitrina_types::config::ContextSettings;
use vitrina_types::llm::Message;
use vitrina_types::memory::{MemoryFact, MemoryType};

use super::instructions::BASE_INSTRUCTIONS;

/// Assembled per-turn prompt material.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub system_prompt: String,
    /// Chronological user/assistant history to replay before the new message.
    pub history: Vec<Message>,
}

/// Builds [`PromptContext`] from persisted state.
pub struct ContextBuilder {
    settings: ContextSettings,
}

impl ContextBuilder {
    pub fn new(settings: ContextSettings) -> Self {
        Self { settings }
    }

    /// Assemble the system prompt and history window for one turn.
    ///
    /// `history` must be chronological (oldest first). The character
    /// budget is enforced by dropping the oldest messages first, so the
    /// most recent exchange always survives.
    pub fn build(
        &self,
        facts: &[MemoryFact],
        session_state: &serde_json::Value,
        history: &[ChatMessage],
    ) -> PromptContext {
        let mut system_prompt = String::from(BASE_INSTRUCTIONS);

        let memories = render_memories(facts);
        if !memories.is_empty() {
            system_prompt.push_str("\n\n");
            system_prompt.push_str(&memories);
        }

        system_prompt.push_str("\n\n");
        system_prompt.push_str(&render_session_state(session_state));

        PromptContext {
            system_prompt,
            history: self.window_history(history),
        }
    }

    /// Take the most recent messages within the count and char budgets,
    /// in chronological order. Tool messages are not replayed.
    fn window_history(&self, history: &[ChatMessage]) -> Vec<Message> {
        let mut window: Vec<Message> = Vec::new();
        let mut chars = 0usize;

        for msg in history.iter().rev() {
            if window.len() >= self.settings.max_history_messages {
                break;
            }
            let message = match msg.role {
                MessageRole::User => Message::user_text(msg.content.clone()),
                MessageRole::Assistant => Message::assistant_text(msg.content.clone()),
                MessageRole::Tool => continue,
            };
            chars += msg.content.len();
            if chars > self.settings.max_context_chars && !window.is_empty() {
                break;
            }
            window.push(message);
        }

        window.reverse();
        window
    }
}

/// Render memory facts into prompt sections grouped by type.
fn render_memories(facts: &[MemoryFact]) -> String {
    let mut personal: Vec<&MemoryFact> = Vec::new();
    let mut preferences: Vec<&MemoryFact> = Vec::new();
    let mut intents: Vec<&MemoryFact> = Vec::new();

    for fact in facts {
        match fact.memory_type {
            MemoryType::Personal => personal.push(fact),
            MemoryType::Preference => preferences.push(fact),
            MemoryType::Intent | MemoryType::Behavior => intents.push(fact),
        }
    }

    let mut sections: Vec<String> = Vec::new();
    if !personal.is_empty() {
        let mut s = String::from("## User Personal Details (use when addressing the user):\n");
        for fact in &personal {
            s.push_str(&format!("- {}: {}\n", fact.key, fact.value));
        }
        sections.push(s);
    }
    if !preferences.is_empty() {
        let mut s = String::from("## User Preferences (page/response format, styling):\n");
        for fact in &preferences {
            s.push_str(&format!("- {}: {}\n", fact.key, fact.value));
        }
        sections.push(s);
    }
    if !intents.is_empty() {
        let mut s = String::from("## User Intents & Behavior (tailor suggestions):\n");
        for fact in &intents {
            s.push_str(&format!("- {}: {}\n", fact.key, fact.value));
        }
        sections.push(s);
    }

    sections.join("\n")
}

/// Render the session state bag: last listings, pagination hint, and
/// any remaining scalar keys.
fn render_session_state(state: &serde_json::Value) -> String {
    let mut out = String::from("## Current Session State:\n");
    out.push_str(
        "- view_type: infer from the user's query ('list of 5 NFTs' -> table; default grid)\n",
    );

    let Some(state) = state.as_object() else {
        return out;
    };

    if let Some(nfts) = state.get("nft_list").and_then(|v| v.as_array())
        && !nfts.is_empty()
    {
        out.push_str(
            "\n**Last NFTs listed in this session (resolve 'the first one', 'that one' here):**\n",
        );
        for (i, nft) in nfts.iter().take(20).enumerate() {
            let id = nft.get("id").and_then(|v| v.as_str()).unwrap_or("?");
            let name = nft.get("name").and_then(|v| v.as_str()).unwrap_or("?");
            let coll = nft.get("collection").and_then(|v| v.as_str()).unwrap_or("");
            out.push_str(&format!("- #{}: {} - {} ({})\n", i + 1, id, name, coll));
        }
        out.push_str(
            "Use the id value as nft_id in get_nft_details. Never ask the user for an NFT ID.\n",
        );
    }

    if let Some(colls) = state.get("collection_list").and_then(|v| v.as_array())
        && !colls.is_empty()
    {
        out.push_str("\n**Last collections listed in this session (use the name for list_nfts):**\n");
        for (i, coll) in colls.iter().take(20).enumerate() {
            let name = coll.get("name").and_then(|v| v.as_str()).unwrap_or("?");
            let count = coll.get("nft_count").and_then(|v| v.as_i64()).unwrap_or(0);
            out.push_str(&format!("- #{}: {} ({} NFTs)\n", i + 1, name, count));
        }
    }

    if let Some(params) = state.get("last_list_params").and_then(|v| v.as_object()) {
        let prev_skip = params.get("skip").and_then(|v| v.as_i64()).unwrap_or(0);
        let prev_limit = params.get("limit").and_then(|v| v.as_i64()).unwrap_or(10);
        let next_skip = prev_skip + prev_limit;

        let mut parts = vec![
            format!("limit={prev_limit}"),
            format!("skip={prev_skip}"),
            format!(
                "sort_by={}",
                params.get("sort_by").and_then(|v| v.as_str()).unwrap_or("tokenId")
            ),
            format!(
                "order={}",
                params.get("order").and_then(|v| v.as_str()).unwrap_or("asc")
            ),
        ];
        for key in ["collection", "search", "status", "min_price_eth", "max_price_eth"] {
            if let Some(value) = params.get(key)
                && !value.is_null()
            {
                parts.push(format!("{key}={value}"));
            }
        }
        out.push_str(&format!(
            "\n**Last list_nfts query (for 'next N' / 'more' pagination):** {}. \
             For the next N results use the same filters and sort with skip={next_skip} and limit=N.\n",
            parts.join(", ")
        ));
    }

    for (key, value) in state {
        if matches!(key.as_str(), "nft_list" | "collection_list" | "last_list_params") {
            continue;
        }
        out.push_str(&format!("- {key}: {value}\n"));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;
    use vitrina_types::memory::{MemorySource, keys};

    fn settings() -> ContextSettings {
        ContextSettings {
            max_history_messages: 4,
            max_context_chars: 100,
        }
    }

    fn msg(role: MessageRole, content: &str, seq: i64) -> ChatMessage {
        let mut m = ChatMessage::user(Uuid::now_v7(), content);
        m.role = role;
        m.seq = seq;
        m
    }

    #[test]
    fn test_system_prompt_includes_memory_sections() {
        let user_id = Uuid::now_v7();
        let facts = vec![
            MemoryFact::new(
                user_id,
                MemoryType::Personal,
                keys::DISPLAY_NAME,
                "Ada",
                MemorySource::Conversation,
            ),
            MemoryFact::new(
                user_id,
                MemoryType::Preference,
                keys::PREFERRED_VIEW,
                "table",
                MemorySource::Conversation,
            ),
        ];
        let builder = ContextBuilder::new(settings());
        let ctx = builder.build(&facts, &json!({}), &[]);
        assert!(ctx.system_prompt.contains("display_name: Ada"));
        assert!(ctx.system_prompt.contains("preferred_view: table"));
        assert!(ctx.system_prompt.contains("User Personal Details"));
    }

    #[test]
    fn test_session_state_renders_nft_list_and_pagination() {
        let state = json!({
            "nft_list": [
                {"id": "nft-001", "name": "Warrior #1", "collection": "Digital Warriors"},
                {"id": "nft-002", "name": "Warrior #2", "collection": "Digital Warriors"}
            ],
            "last_list_params": {"limit": 6, "skip": 0, "sort_by": "price_eth", "order": "asc"}
        });
        let builder = ContextBuilder::new(settings());
        let ctx = builder.build(&[], &state, &[]);
        assert!(ctx.system_prompt.contains("#1: nft-001 - Warrior #1"));
        assert!(ctx.system_prompt.contains("skip=6"));
        assert!(ctx.system_prompt.contains("sort_by=price_eth"));
    }

    #[test]
    fn test_history_window_caps_message_count() {
        let history: Vec<ChatMessage> = (0..10)
            .map(|i| msg(MessageRole::User, &format!("m{i}"), i))
            .collect();
        let builder = ContextBuilder::new(settings());
        let ctx = builder.build(&[], &json!({}), &history);
        assert_eq!(ctx.history.len(), 4);
        // Most recent survive, chronological order preserved
        match &ctx.history[3].content[0] {
            vitrina_types::llm::ContentPart::Text { text } => assert_eq!(text, "m9"),
            _ => panic!("expected text"),
        }
    }

    #[test]
    fn test_history_window_drops_oldest_on_char_budget() {
        let long = "x".repeat(90);
        let history = vec![
            msg(MessageRole::User, &long, 0),
            msg(MessageRole::Assistant, "short answer", 1),
            msg(MessageRole::User, "latest", 2),
        ];
        let builder = ContextBuilder::new(settings());
        let ctx = builder.build(&[], &json!({}), &history);
        // 90 + 12 + 6 chars exceeds the 100 budget; the oldest drops.
        assert_eq!(ctx.history.len(), 2);
    }

    #[test]
    fn test_tool_messages_not_replayed() {
        let history = vec![
            msg(MessageRole::User, "hi", 0),
            msg(MessageRole::Tool, "raw tool result", 1),
            msg(MessageRole::Assistant, "hello", 2),
        ];
        let builder = ContextBuilder::new(settings());
        let ctx = builder.build(&[], &json!({}), &history);
        assert_eq!(ctx.history.len(), 2);
    }
}
