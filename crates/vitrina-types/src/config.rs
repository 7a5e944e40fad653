//! Configuration types for Vitrina.
//!
//! `VitrinaConfig` represents the top-level `vitrina.toml` that controls
//! agent behavior, context assembly budgets, and the catalog/renderer
//! endpoints. All fields have sensible defaults so an empty file (or no
//! file at all) yields a working configuration.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the Vitrina service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VitrinaConfig {
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub context: ContextSettings,
    #[serde(default)]
    pub catalog: CatalogSettings,
}

/// Settings for the model/tool loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Model identifier sent to the provider.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Hard cap on model/tool rounds within a single turn.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,

    /// Per-tool-call timeout in seconds.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Outer timeout for an entire turn in seconds.
    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: u64,

    /// Retries for transient provider failures (rate limit, overload).
    #[serde(default = "default_model_retries")]
    pub model_retries: u32,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_tool_rounds() -> u32 {
    5
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_turn_timeout_secs() -> u64 {
    120
}

fn default_model_retries() -> u32 {
    3
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_tool_rounds: default_max_tool_rounds(),
            tool_timeout_secs: default_tool_timeout_secs(),
            turn_timeout_secs: default_turn_timeout_secs(),
            model_retries: default_model_retries(),
        }
    }
}

/// Settings for prompt context assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSettings {
    /// How many recent messages to replay into the prompt.
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,

    /// Character budget for replayed history; oldest messages drop first.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

fn default_max_history_messages() -> usize {
    20
}

fn default_max_context_chars() -> usize {
    24_000
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            max_history_messages: default_max_history_messages(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

/// Endpoints for the external catalog API and component renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    #[serde(default = "default_catalog_base_url")]
    pub base_url: String,

    #[serde(default = "default_renderer_base_url")]
    pub renderer_base_url: String,

    /// Timeout for catalog and renderer HTTP calls in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_catalog_base_url() -> String {
    "http://localhost:4000/api".to_string()
}

fn default_renderer_base_url() -> String {
    "http://localhost:4000/render".to_string()
}

fn default_http_timeout_secs() -> u64 {
    15
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            base_url: default_catalog_base_url(),
            renderer_base_url: default_renderer_base_url(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}
