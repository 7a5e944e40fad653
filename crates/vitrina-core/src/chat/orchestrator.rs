//! The chat orchestrator: one entry point per conversational turn.
//!
//! A turn is: resolve user and session, serialize on the session lock,
//! persist the user message, assemble the prompt, run the agent loop
//! under the turn deadline, apply directives (session state and memory),
//! parse the reply into blocks, persist the assistant message.
//!
//! Directive and memory failures degrade (logged, turn continues);
//! repository failures on the message path and model failures abort
//! the turn.

use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use vitrina_types::chat::{ChatMessage, ChatSession};
use vitrina_types::config::VitrinaConfig;
use vitrina_types::content::ContentBlock;
use vitrina_types::error::ChatError;

use crate::agent::markers::extract_directives;
use crate::agent::parser::parse_blocks;
use crate::agent::{AgentRunner, ContextBuilder};
use crate::llm::BoxLlmProvider;
use crate::memory::{MemoryManager, MemoryRepository};
use crate::tool::ToolRegistry;

use super::locks::SessionLocks;
use super::repository::ChatRepository;

const FALLBACK_REPLY: &str = "Sorry, I could not put together a reply. Please try again.";

/// Result of one completed turn.
#[derive(Debug)]
pub struct TurnOutput {
    pub session_id: Uuid,
    pub blocks: Vec<ContentBlock>,
}

/// Coordinates repositories, the model provider, and the tool registry
/// for the chat endpoints.
pub struct ChatOrchestrator<C, M> {
    chat: C,
    memory: M,
    provider: BoxLlmProvider,
    tools: ToolRegistry,
    config: VitrinaConfig,
    locks: SessionLocks,
}

impl<C: ChatRepository, M: MemoryRepository> ChatOrchestrator<C, M> {
    pub fn new(
        chat: C,
        memory: M,
        provider: BoxLlmProvider,
        tools: ToolRegistry,
        config: VitrinaConfig,
    ) -> Self {
        Self {
            chat,
            memory,
            provider,
            tools,
            config,
            locks: SessionLocks::new(),
        }
    }

    /// Run one turn for a user message.
    ///
    /// `session_id = None` starts a new session. A supplied session id
    /// must exist and belong to the resolved user; anything else is a
    /// [`ChatError::SessionMismatch`], never a silent new session.
    #[instrument(skip(self, message), fields(external_id))]
    pub async fn handle_turn(
        &self,
        external_id: &str,
        session_id: Option<Uuid>,
        message: &str,
    ) -> Result<TurnOutput, ChatError> {
        let user = self.chat.get_or_create_user(external_id).await?;

        let session = match session_id {
            Some(id) => self
                .chat
                .get_session(&id)
                .await?
                .filter(|s| s.user_id == user.id)
                .ok_or_else(|| ChatError::SessionMismatch(id.to_string()))?,
            None => {
                let session = ChatSession::new(user.id, Some(derive_title(message)));
                self.chat.create_session(&session).await?;
                info!(session_id = %session.id, "Started new session");
                session
            }
        };

        let _guard = self.locks.acquire(session.id).await;

        // Reload state under the lock; a previous turn may have merged
        // directives after our initial read.
        let session = self
            .chat
            .get_session(&session.id)
            .await?
            .ok_or_else(|| ChatError::SessionMismatch(session.id.to_string()))?;

        self.chat
            .save_message(&ChatMessage::user(session.id, message))
            .await?;

        let facts = self.memory.get_facts(&user.id).await?;
        let history = self
            .chat
            .get_recent_messages(&session.id, self.config.context.max_history_messages + 1)
            .await?;
        // The just-saved user message is replayed separately by the runner.
        let history = &history[..history.len().saturating_sub(1)];

        let context =
            ContextBuilder::new(self.config.context.clone()).build(&facts, &session.state, history);

        let runner = AgentRunner::new(&self.provider, &self.tools, &self.config.agent);
        let deadline = std::time::Duration::from_secs(self.config.agent.turn_timeout_secs);
        let outcome = tokio::time::timeout(deadline, runner.run(&context, message))
            .await
            .map_err(|_| ChatError::TurnTimeout(self.config.agent.turn_timeout_secs))??;

        let (directives, sanitized) = extract_directives(&outcome.text);

        if !directives.session_update.is_empty() {
            if let Err(e) = self
                .chat
                .update_session_state(&session.id, &directives.session_update)
                .await
            {
                warn!(session_id = %session.id, error = %e, "Session state merge failed");
            }
        }

        if let Err(e) = MemoryManager::extract_and_merge(
            &self.memory,
            &user.id,
            message,
            &directives.personal,
            &directives.preference,
        )
        .await
        {
            warn!(user_id = %user.id, error = %e, "Memory merge failed");
        }

        let mut blocks = parse_blocks(&sanitized);
        if blocks.is_empty() {
            blocks.push(ContentBlock::text(FALLBACK_REPLY));
        }

        let tool_calls = if outcome.invocations.is_empty() {
            None
        } else {
            Some(json!(outcome.invocations))
        };
        self.chat
            .save_message(&ChatMessage::assistant(
                session.id,
                sanitized,
                blocks.clone(),
                tool_calls,
            ))
            .await?;

        info!(session_id = %session.id, blocks = blocks.len(), "Turn complete");
        Ok(TurnOutput {
            session_id: session.id,
            blocks,
        })
    }

    /// Sessions for an external user id, most recently updated first.
    pub async fn list_sessions(&self, external_id: &str) -> Result<Vec<ChatSession>, ChatError> {
        let user = self.chat.get_or_create_user(external_id).await?;
        Ok(self.chat.list_sessions(&user.id).await?)
    }

    /// Full message history of a session, chronological order.
    pub async fn session_messages(&self, session_id: &Uuid) -> Result<Vec<ChatMessage>, ChatError> {
        if self.chat.get_session(session_id).await?.is_none() {
            return Err(ChatError::SessionMismatch(session_id.to_string()));
        }
        Ok(self.chat.list_messages(session_id).await?)
    }
}

/// First line of the message, clipped to 60 chars on a char boundary.
fn derive_title(message: &str) -> String {
    let first_line = message.lines().next().unwrap_or("").trim();
    first_line.chars().take(60).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use serde_json::{Map, Value, json};
    use vitrina_types::error::RepositoryError;
    use vitrina_types::llm::{
        CompletionRequest, CompletionResponse, ContentPart, LlmError, StopReason, Usage,
    };
    use vitrina_types::memory::{MemoryFact, MemoryType};
    use vitrina_types::user::User;

    use crate::llm::LlmProvider;

    #[derive(Default)]
    struct FakeChatRepo {
        users: Mutex<HashMap<String, User>>,
        sessions: Mutex<HashMap<Uuid, ChatSession>>,
        messages: Mutex<Vec<ChatMessage>>,
    }

    impl ChatRepository for FakeChatRepo {
        async fn get_or_create_user(&self, external_id: &str) -> Result<User, RepositoryError> {
            let mut users = self.users.lock().unwrap();
            Ok(users
                .entry(external_id.to_string())
                .or_insert_with(|| User::new(external_id))
                .clone())
        }

        async fn get_session(
            &self,
            session_id: &Uuid,
        ) -> Result<Option<ChatSession>, RepositoryError> {
            Ok(self.sessions.lock().unwrap().get(session_id).cloned())
        }

        async fn create_session(&self, session: &ChatSession) -> Result<(), RepositoryError> {
            self.sessions
                .lock()
                .unwrap()
                .insert(session.id, session.clone());
            Ok(())
        }

        async fn update_session_state(
            &self,
            session_id: &Uuid,
            update: &Map<String, Value>,
        ) -> Result<(), RepositoryError> {
            let mut sessions = self.sessions.lock().unwrap();
            let session = sessions.get_mut(session_id).ok_or(RepositoryError::NotFound)?;
            let state = session.state.as_object_mut().ok_or(RepositoryError::NotFound)?;
            for (k, v) in update {
                state.insert(k.clone(), v.clone());
            }
            Ok(())
        }

        async fn list_sessions(&self, user_id: &Uuid) -> Result<Vec<ChatSession>, RepositoryError> {
            let mut sessions: Vec<ChatSession> = self
                .sessions
                .lock()
                .unwrap()
                .values()
                .filter(|s| s.user_id == *user_id)
                .cloned()
                .collect();
            sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            Ok(sessions)
        }

        async fn save_message(&self, message: &ChatMessage) -> Result<i64, RepositoryError> {
            let mut messages = self.messages.lock().unwrap();
            let seq = messages
                .iter()
                .filter(|m| m.session_id == message.session_id)
                .map(|m| m.seq)
                .max()
                .map_or(0, |s| s + 1);
            let mut message = message.clone();
            message.seq = seq;
            messages.push(message);
            Ok(seq)
        }

        async fn get_recent_messages(
            &self,
            session_id: &Uuid,
            limit: usize,
        ) -> Result<Vec<ChatMessage>, RepositoryError> {
            let mut messages = self.list_messages(session_id).await?;
            if messages.len() > limit {
                messages.drain(..messages.len() - limit);
            }
            Ok(messages)
        }

        async fn list_messages(
            &self,
            session_id: &Uuid,
        ) -> Result<Vec<ChatMessage>, RepositoryError> {
            let mut messages: Vec<ChatMessage> = self
                .messages
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.session_id == *session_id)
                .cloned()
                .collect();
            messages.sort_by_key(|m| m.seq);
            Ok(messages)
        }
    }

    #[derive(Default)]
    struct FakeMemoryRepo {
        facts: Mutex<Vec<MemoryFact>>,
    }

    impl MemoryRepository for FakeMemoryRepo {
        async fn upsert_fact(&self, fact: &MemoryFact) -> Result<(), RepositoryError> {
            let mut facts = self.facts.lock().unwrap();
            facts.retain(|f| !(f.memory_type == fact.memory_type && f.key == fact.key));
            facts.push(fact.clone());
            Ok(())
        }

        async fn get_facts(&self, _user_id: &Uuid) -> Result<Vec<MemoryFact>, RepositoryError> {
            Ok(self.facts.lock().unwrap().clone())
        }

        async fn delete_fact(
            &self,
            _user_id: &Uuid,
            memory_type: MemoryType,
            key: &str,
        ) -> Result<(), RepositoryError> {
            self.facts
                .lock()
                .unwrap()
                .retain(|f| !(f.memory_type == memory_type && f.key == key));
            Ok(())
        }

        async fn delete_facts_by_type(
            &self,
            _user_id: &Uuid,
            memory_type: MemoryType,
        ) -> Result<u64, RepositoryError> {
            let mut facts = self.facts.lock().unwrap();
            let before = facts.len();
            facts.retain(|f| f.memory_type != memory_type);
            Ok((before - facts.len()) as u64)
        }
    }

    struct ScriptedProvider {
        script: Mutex<Vec<Result<CompletionResponse, LlmError>>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<CompletionResponse, LlmError>>) -> Self {
            Self {
                script: Mutex::new(script),
            }
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.script.lock().unwrap().remove(0)
        }
    }

    fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            id: "msg".to_string(),
            content: vec![ContentPart::Text {
                text: text.to_string(),
            }],
            model: "test".to_string(),
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
        }
    }

    fn orchestrator(
        script: Vec<Result<CompletionResponse, LlmError>>,
    ) -> ChatOrchestrator<FakeChatRepo, FakeMemoryRepo> {
        ChatOrchestrator::new(
            FakeChatRepo::default(),
            FakeMemoryRepo::default(),
            BoxLlmProvider::new(ScriptedProvider::new(script)),
            ToolRegistry::new(),
            VitrinaConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_new_session_created_and_messages_persisted() {
        let orch = orchestrator(vec![Ok(text_response("Hello!"))]);

        let output = orch.handle_turn("ext-1", None, "hi there").await.unwrap();
        assert_eq!(output.blocks.len(), 1);
        assert!(matches!(output.blocks[0], ContentBlock::Text { .. }));

        let messages = orch.session_messages(&output.session_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].seq, 0);
        assert_eq!(messages[0].content, "hi there");
        assert_eq!(messages[1].seq, 1);
        assert_eq!(messages[1].content, "Hello!");

        let sessions = orch.list_sessions("ext-1").await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].title.as_deref(), Some("hi there"));
    }

    #[tokio::test]
    async fn test_unknown_session_rejected() {
        let orch = orchestrator(vec![Ok(text_response("unused"))]);

        let err = orch
            .handle_turn("ext-1", Some(Uuid::now_v7()), "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::SessionMismatch(_)));
    }

    #[tokio::test]
    async fn test_foreign_session_rejected() {
        let orch = orchestrator(vec![
            Ok(text_response("first")),
            Ok(text_response("unused")),
        ]);
        let output = orch.handle_turn("owner", None, "hi").await.unwrap();

        let err = orch
            .handle_turn("intruder", Some(output.session_id), "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::SessionMismatch(_)));
    }

    #[tokio::test]
    async fn test_session_reused_across_turns() {
        let orch = orchestrator(vec![
            Ok(text_response("first reply")),
            Ok(text_response("second reply")),
        ]);
        let first = orch.handle_turn("ext-1", None, "one").await.unwrap();
        let second = orch
            .handle_turn("ext-1", Some(first.session_id), "two")
            .await
            .unwrap();
        assert_eq!(first.session_id, second.session_id);

        let messages = orch.session_messages(&first.session_id).await.unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(
            messages.iter().map(|m| m.seq).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_concurrent_turns_on_one_session_never_interleave() {
        use vitrina_types::chat::MessageRole;

        let orch = orchestrator(vec![
            Ok(text_response("reply one")),
            Ok(text_response("reply two")),
        ]);
        let user = orch.chat.get_or_create_user("ext-1").await.unwrap();
        let session = ChatSession::new(user.id, None);
        orch.chat.create_session(&session).await.unwrap();

        let (a, b) = tokio::join!(
            orch.handle_turn("ext-1", Some(session.id), "first question"),
            orch.handle_turn("ext-1", Some(session.id), "second question"),
        );
        a.unwrap();
        b.unwrap();

        let messages = orch.session_messages(&session.id).await.unwrap();
        assert_eq!(
            messages.iter().map(|m| m.seq).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        // Each user message is immediately followed by its reply; the
        // turns never interleave.
        for pair in messages.chunks(2) {
            assert_eq!(pair[0].role, MessageRole::User);
            assert_eq!(pair[1].role, MessageRole::Assistant);
        }
    }

    #[tokio::test]
    async fn test_session_data_directive_merged_into_state() {
        let raw = "Here are the NFTs.\n\
                   [SESSION_DATA]{\"nft_list\": [{\"id\": \"nft-1\"}]}[/SESSION_DATA]";
        let orch = orchestrator(vec![Ok(text_response(raw))]);

        let output = orch.handle_turn("ext-1", None, "show nfts").await.unwrap();

        let sessions = orch.list_sessions("ext-1").await.unwrap();
        assert_eq!(sessions[0].state["nft_list"], json!([{"id": "nft-1"}]));

        // Markers never reach the persisted reply or the blocks.
        let messages = orch.session_messages(&output.session_id).await.unwrap();
        assert_eq!(messages[1].content, "Here are the NFTs.");
        assert!(
            output
                .blocks
                .iter()
                .all(|b| !matches!(b, ContentBlock::Text { markdown } if markdown.contains("SESSION_DATA")))
        );
    }

    #[tokio::test]
    async fn test_component_reply_parsed_into_blocks() {
        let raw = "Here you go:\n\
                   ::COMPONENT_START::grid::\n<div>grid</div>\n::COMPONENT_END::\n\
                   Anything else?";
        let orch = orchestrator(vec![Ok(text_response(raw))]);

        let output = orch.handle_turn("ext-1", None, "show nfts").await.unwrap();
        assert_eq!(output.blocks.len(), 3);
        assert!(matches!(
            &output.blocks[1],
            ContentBlock::HtmlComponent { template, .. } if template == "grid"
        ));
    }

    #[tokio::test]
    async fn test_empty_reply_falls_back_to_text_block() {
        // Model emits only markers; sanitization leaves nothing.
        let raw = "[SESSION_DATA]{\"k\": 1}[/SESSION_DATA]";
        let orch = orchestrator(vec![Ok(text_response(raw))]);

        let output = orch.handle_turn("ext-1", None, "hi").await.unwrap();
        assert_eq!(output.blocks.len(), 1);
        assert!(matches!(
            &output.blocks[0],
            ContentBlock::Text { markdown } if markdown.contains("try again")
        ));
    }

    #[tokio::test]
    async fn test_store_personal_directive_saved() {
        let raw = "Nice to meet you!\n[STORE_PERSONAL]{\"display_name\": \"Ada\"}[/STORE_PERSONAL]";
        let orch = orchestrator(vec![
            Ok(text_response(raw)),
            Ok(text_response("Hello Ada!")),
        ]);

        orch.handle_turn("ext-1", None, "call me Ada").await.unwrap();
        let facts = orch.memory.get_facts(&Uuid::nil()).await.unwrap();
        assert!(
            facts
                .iter()
                .any(|f| f.key == "display_name" && f.value == "Ada")
        );
    }

    #[tokio::test]
    async fn test_model_failure_aborts_turn_but_keeps_user_message() {
        let orch = orchestrator(vec![Err(LlmError::AuthenticationFailed)]);

        let err = orch.handle_turn("ext-1", None, "hi").await.unwrap_err();
        assert!(matches!(err, ChatError::Model(_)));

        let sessions = orch.list_sessions("ext-1").await.unwrap();
        let messages = orch.session_messages(&sessions[0].id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hi");
    }

    #[test]
    fn test_derive_title_clips_first_line() {
        assert_eq!(derive_title("hello\nworld"), "hello");
        let long = "x".repeat(100);
        assert_eq!(derive_title(&long).chars().count(), 60);
    }
}
