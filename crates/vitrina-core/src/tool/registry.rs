//! Explicit tool registry with argument validation.
//!
//! The registry is built once at startup from concrete tool instances
//! and passed by reference into the agent loop. Before dispatch, model
//! supplied arguments are validated against the tool's input schema;
//! mismatches become [`ToolError::InvalidArguments`] and are reported
//! back to the model, never to the HTTP caller.

use std::collections::HashMap;

use tracing::debug;

use vitrina_types::error::ToolError;
use vitrina_types::llm::ToolSchema;

use super::BoxTool;

/// Name-indexed collection of the tools available to the agent.
pub struct ToolRegistry {
    tools: HashMap<String, BoxTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool under its advertised name.
    pub fn register(&mut self, tool: BoxTool) {
        debug!(tool = tool.name(), "Registering tool");
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Schemas for every registered tool, sorted by name for stable output.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Validate arguments and invoke the named tool.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::Unknown(name.to_string()))?;

        validate_arguments(name, &tool.input_schema(), &arguments)?;
        tool.invoke(arguments).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Check model-supplied arguments against a tool's input schema.
///
/// Covers the subset of JSON Schema the tools actually use: top-level
/// object with typed properties, a required list, and optional enums.
/// Unknown keys are rejected so the model gets a corrective error
/// instead of silently dropped parameters.
fn validate_arguments(
    tool: &str,
    schema: &serde_json::Value,
    arguments: &serde_json::Value,
) -> Result<(), ToolError> {
    let invalid = |reason: String| ToolError::InvalidArguments {
        tool: tool.to_string(),
        reason,
    };

    let args = arguments
        .as_object()
        .ok_or_else(|| invalid("arguments must be a JSON object".to_string()))?;

    let empty = serde_json::Map::new();
    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .unwrap_or(&empty);

    for key in args.keys() {
        if !properties.contains_key(key) {
            return Err(invalid(format!("unknown argument '{key}'")));
        }
    }

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for req in required {
            if let Some(name) = req.as_str()
                && !args.contains_key(name)
            {
                return Err(invalid(format!("missing required argument '{name}'")));
            }
        }
    }

    for (key, value) in args {
        let Some(prop) = properties.get(key) else {
            continue;
        };

        if let Some(expected) = prop.get("type").and_then(|t| t.as_str()) {
            let ok = match expected {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "object" => value.is_object(),
                "array" => value.is_array(),
                _ => true,
            };
            if !ok {
                return Err(invalid(format!("argument '{key}' must be a {expected}")));
            }
        }

        if let Some(allowed) = prop.get("enum").and_then(|e| e.as_array())
            && !allowed.contains(value)
        {
            return Err(invalid(format!(
                "argument '{key}' must be one of {allowed:?}"
            )));
        }
    }

    Ok(())
}
