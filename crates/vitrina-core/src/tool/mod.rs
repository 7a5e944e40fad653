//! Tool abstraction for the agent loop.
//!
//! Tools are registered explicitly at startup in a [`registry::ToolRegistry`];
//! there is no reflection or dynamic discovery. Each tool advertises a
//! JSON schema to the model and receives validated arguments.

pub mod registry;

use std::future::Future;
use std::pin::Pin;

use vitrina_types::error::ToolError;
use vitrina_types::llm::ToolSchema;

pub use registry::ToolRegistry;

/// Trait for catalog-facing tools callable by the model.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
/// Implementations live in vitrina-infra (e.g., `ListNftsTool`).
///
/// `invoke` returns the textual tool result fed back to the model. It
/// may embed component markers and session-data directives; the
/// orchestrator extracts those after the loop completes.
pub trait CatalogTool: Send + Sync {
    /// Tool name as advertised to the model (e.g., "list_nfts").
    fn name(&self) -> &str;

    /// One-paragraph description for the model.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's input object.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with already-validated arguments.
    fn invoke(
        &self,
        arguments: serde_json::Value,
    ) -> impl Future<Output = Result<String, ToolError>> + Send;
}

/// Object-safe version of [`CatalogTool`] with boxed futures.
///
/// Same pattern as `LlmProviderDyn`: blanket-impl over all `CatalogTool`
/// implementations so the registry can hold heterogeneous tools.
pub trait CatalogToolDyn: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn input_schema(&self) -> serde_json::Value;

    fn invoke_boxed(
        &self,
        arguments: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + '_>>;
}

impl<T: CatalogTool> CatalogToolDyn for T {
    fn name(&self) -> &str {
        CatalogTool::name(self)
    }

    fn description(&self) -> &str {
        CatalogTool::description(self)
    }

    fn input_schema(&self) -> serde_json::Value {
        CatalogTool::input_schema(self)
    }

    fn invoke_boxed(
        &self,
        arguments: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + '_>> {
        Box::pin(self.invoke(arguments))
    }
}

/// Type-erased tool for registry storage.
pub struct BoxTool {
    inner: Box<dyn CatalogToolDyn + Send + Sync>,
}

impl BoxTool {
    /// Wrap a concrete `CatalogTool` in a type-erased box.
    pub fn new<T: CatalogTool + 'static>(tool: T) -> Self {
        Self {
            inner: Box::new(tool),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn description(&self) -> &str {
        self.inner.description()
    }

    pub fn input_schema(&self) -> serde_json::Value {
        self.inner.input_schema()
    }

    /// The schema advertised to the model for this tool.
    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }

    pub async fn invoke(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        self.inner.invoke_boxed(arguments).await
    }
}
