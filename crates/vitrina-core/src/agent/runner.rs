//! The model/tool loop.
//!
//! One turn alternates between the model and tool dispatch until the
//! model stops requesting tools or the round cap is hit. Transient
//! provider failures are retried with doubling backoff; tool failures
//! and timeouts are fed back to the model as error results so it can
//! recover within the same turn.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use vitrina_types::config::AgentSettings;
use vitrina_types::error::ToolError;
use vitrina_types::llm::{
    CompletionRequest, CompletionResponse, ContentPart, LlmError, Message, Role, StopReason,
};

use crate::llm::BoxLlmProvider;
use crate::tool::ToolRegistry;

use super::context::PromptContext;

const RETRY_BASE_DELAY_MS: u64 = 250;

const INCOMPLETE_NOTE: &str =
    "\n\n*I had to stop before finishing all lookups; ask me to continue if something is missing.*";

/// Record of one tool call made during a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: serde_json::Value,
    /// First 200 chars of the result (or the error message).
    pub result_preview: String,
    pub is_error: bool,
    pub duration_ms: u64,
}

/// What the loop produced: accumulated text plus tool-call metadata.
#[derive(Debug)]
pub struct AgentOutcome {
    /// Text parts from every round, joined with blank lines.
    pub text: String,
    pub invocations: Vec<ToolInvocation>,
}

/// Drives the model/tool loop for a single turn.
pub struct AgentRunner<'a> {
    provider: &'a BoxLlmProvider,
    tools: &'a ToolRegistry,
    settings: &'a AgentSettings,
}

impl<'a> AgentRunner<'a> {
    pub fn new(
        provider: &'a BoxLlmProvider,
        tools: &'a ToolRegistry,
        settings: &'a AgentSettings,
    ) -> Self {
        Self {
            provider,
            tools,
            settings,
        }
    }

    /// Run the loop to completion for one user message.
    pub async fn run(
        &self,
        context: &PromptContext,
        user_message: &str,
    ) -> Result<AgentOutcome, LlmError> {
        let mut messages = context.history.clone();
        messages.push(Message::user_text(user_message));

        let tools = if self.tools.is_empty() {
            None
        } else {
            Some(self.tools.schemas())
        };

        let mut texts: Vec<String> = Vec::new();
        let mut invocations: Vec<ToolInvocation> = Vec::new();
        let mut rounds_exhausted = true;

        for round in 0..self.settings.max_tool_rounds {
            let request = CompletionRequest {
                model: self.settings.model.clone(),
                messages: messages.clone(),
                system: Some(context.system_prompt.clone()),
                max_tokens: self.settings.max_tokens,
                temperature: Some(self.settings.temperature),
                tools: tools.clone(),
            };

            let response = self.complete_with_retry(&request).await?;
            debug!(round, stop_reason = %response.stop_reason, "Model round complete");

            let text = response.text();
            if !text.trim().is_empty() {
                texts.push(text);
            }

            let tool_uses: Vec<(String, String, serde_json::Value)> = response
                .tool_uses()
                .into_iter()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();

            if response.stop_reason != StopReason::ToolUse || tool_uses.is_empty() {
                rounds_exhausted = false;
                break;
            }

            messages.push(Message {
                role: Role::Assistant,
                content: response.content.clone(),
            });

            let mut results: Vec<ContentPart> = Vec::new();
            for (id, name, input) in tool_uses {
                let (part, invocation) = self.dispatch_tool(&id, &name, input).await;
                results.push(part);
                invocations.push(invocation);
            }
            messages.push(Message {
                role: Role::User,
                content: results,
            });
        }

        let mut text = texts.join("\n\n");
        if rounds_exhausted {
            warn!(
                max_rounds = self.settings.max_tool_rounds,
                "Tool round cap reached; finishing turn with accumulated text"
            );
            text.push_str(INCOMPLETE_NOTE);
        }

        info!(
            tool_calls = invocations.len(),
            "Agent loop finished"
        );
        Ok(AgentOutcome { text, invocations })
    }

    /// One tool call with its own timeout. Failures become error tool
    /// results; they never abort the turn.
    async fn dispatch_tool(
        &self,
        tool_use_id: &str,
        name: &str,
        arguments: serde_json::Value,
    ) -> (ContentPart, ToolInvocation) {
        let timeout = Duration::from_secs(self.settings.tool_timeout_secs);
        let started = Instant::now();

        let result = match tokio::time::timeout(timeout, self.tools.dispatch(name, arguments.clone()))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                tool: name.to_string(),
                timeout_secs: self.settings.tool_timeout_secs,
            }),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                let invocation = ToolInvocation {
                    name: name.to_string(),
                    arguments,
                    result_preview: preview(&output),
                    is_error: false,
                    duration_ms,
                };
                let part = ContentPart::ToolResult {
                    tool_use_id: tool_use_id.to_string(),
                    content: output,
                    is_error: false,
                };
                (part, invocation)
            }
            Err(e) => {
                warn!(tool = name, error = %e, "Tool call failed");
                let message = e.to_string();
                let invocation = ToolInvocation {
                    name: name.to_string(),
                    arguments,
                    result_preview: preview(&message),
                    is_error: true,
                    duration_ms,
                };
                let part = ContentPart::ToolResult {
                    tool_use_id: tool_use_id.to_string(),
                    content: message,
                    is_error: true,
                };
                (part, invocation)
            }
        }
    }

    /// Retry transient provider failures with doubling backoff.
    async fn complete_with_retry(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let mut attempt = 0u32;
        loop {
            match self.provider.complete(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.settings.model_retries => {
                    let delay = Duration::from_millis(RETRY_BASE_DELAY_MS << attempt);
                    warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64,
                        "Transient model error, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn preview(s: &str) -> String {
    if s.len() <= 200 {
        s.to_string()
    } else {
        let mut end = 200;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmProvider;
    use crate::tool::{BoxTool, CatalogTool};
    use serde_json::json;
    use std::sync::Mutex;
    use vitrina_types::llm::Usage;

    /// Provider that replays a scripted sequence of results.
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
            self.script
                .lock()
                .unwrap()
                .remove(0)
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

    fn tool_use_response(name: &str, input: serde_json::Value) -> CompletionResponse {
        CompletionResponse {
            id: "msg".to_string(),
            content: vec![ContentPart::ToolUse {
                id: "toolu_1".to_string(),
                name: name.to_string(),
                input,
            }],
            model: "test".to_string(),
            stop_reason: StopReason::ToolUse,
            usage: Usage::default(),
        }
    }

    struct GridTool;

    impl CatalogTool for GridTool {
        fn name(&self) -> &str {
            "list_nfts"
        }

        fn description(&self) -> &str {
            "Lists NFTs."
        }

        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {"limit": {"type": "integer"}}})
        }

        async fn invoke(&self, _arguments: serde_json::Value) -> Result<String, ToolError> {
            Ok("::COMPONENT_START::grid::<div/>::COMPONENT_END::".to_string())
        }
    }

    struct FailingTool;

    impl CatalogTool for FailingTool {
        fn name(&self) -> &str {
            "get_nft_details"
        }

        fn description(&self) -> &str {
            "Always fails."
        }

        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {}})
        }

        async fn invoke(&self, _arguments: serde_json::Value) -> Result<String, ToolError> {
            Err(ToolError::Execution {
                tool: "get_nft_details".to_string(),
                reason: "catalog unreachable".to_string(),
            })
        }
    }

    fn settings() -> AgentSettings {
        AgentSettings {
            model_retries: 1,
            ..AgentSettings::default()
        }
    }

    fn empty_context() -> PromptContext {
        PromptContext {
            system_prompt: "test".to_string(),
            history: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_plain_text_turn() {
        let provider = BoxLlmProvider::new(ScriptedProvider::new(vec![Ok(text_response(
            "Hello there!",
        ))]));
        let tools = ToolRegistry::new();
        let settings = settings();
        let runner = AgentRunner::new(&provider, &tools, &settings);

        let outcome = runner.run(&empty_context(), "hi").await.unwrap();
        assert_eq!(outcome.text, "Hello there!");
        assert!(outcome.invocations.is_empty());
    }

    #[tokio::test]
    async fn test_tool_round_then_done() {
        let provider = BoxLlmProvider::new(ScriptedProvider::new(vec![
            Ok(tool_use_response("list_nfts", json!({"limit": 6}))),
            Ok(text_response("Here they are.")),
        ]));
        let mut tools = ToolRegistry::new();
        tools.register(BoxTool::new(GridTool));
        let settings = settings();
        let runner = AgentRunner::new(&provider, &tools, &settings);

        let outcome = runner.run(&empty_context(), "show me NFTs").await.unwrap();
        assert_eq!(outcome.text, "Here they are.");
        assert_eq!(outcome.invocations.len(), 1);
        assert_eq!(outcome.invocations[0].name, "list_nfts");
        assert!(!outcome.invocations[0].is_error);
    }

    #[tokio::test]
    async fn test_tool_error_recovered_in_loop() {
        let provider = BoxLlmProvider::new(ScriptedProvider::new(vec![
            Ok(tool_use_response("get_nft_details", json!({}))),
            Ok(text_response("That item does not exist, sorry.")),
        ]));
        let mut tools = ToolRegistry::new();
        tools.register(BoxTool::new(FailingTool));
        let settings = settings();
        let runner = AgentRunner::new(&provider, &tools, &settings);

        let outcome = runner.run(&empty_context(), "details please").await.unwrap();
        assert!(outcome.text.contains("does not exist"));
        assert_eq!(outcome.invocations.len(), 1);
        assert!(outcome.invocations[0].is_error);
        assert!(outcome.invocations[0].result_preview.contains("catalog unreachable"));
    }

    #[tokio::test]
    async fn test_round_cap_appends_note() {
        // Model asks for a tool on every round.
        let script: Vec<_> = (0..5)
            .map(|_| Ok(tool_use_response("list_nfts", json!({}))))
            .collect();
        let provider = BoxLlmProvider::new(ScriptedProvider::new(script));
        let mut tools = ToolRegistry::new();
        tools.register(BoxTool::new(GridTool));
        let settings = settings();
        let runner = AgentRunner::new(&provider, &tools, &settings);

        let outcome = runner.run(&empty_context(), "loop forever").await.unwrap();
        assert!(outcome.text.contains("had to stop"));
        assert_eq!(outcome.invocations.len(), 5);
    }

    #[tokio::test]
    async fn test_transient_error_retried() {
        let provider = BoxLlmProvider::new(ScriptedProvider::new(vec![
            Err(LlmError::Overloaded("529".to_string())),
            Ok(text_response("Recovered.")),
        ]));
        let tools = ToolRegistry::new();
        let settings = settings();
        let runner = AgentRunner::new(&provider, &tools, &settings);

        let outcome = runner.run(&empty_context(), "hi").await.unwrap();
        assert_eq!(outcome.text, "Recovered.");
    }

    #[tokio::test]
    async fn test_fatal_error_not_retried() {
        let provider = BoxLlmProvider::new(ScriptedProvider::new(vec![Err(
            LlmError::AuthenticationFailed,
        )]));
        let tools = ToolRegistry::new();
        let settings = settings();
        let runner = AgentRunner::new(&provider, &tools, &settings);

        let err = runner.run(&empty_context(), "hi").await.unwrap_err();
        assert!(matches!(err, LlmError::AuthenticationFailed));
    }
}
