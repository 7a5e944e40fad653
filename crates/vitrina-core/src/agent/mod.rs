//! The agent: prompt assembly, the model/tool loop, and output parsing.

pub mod context;
pub mod instructions;
pub mod markers;
pub mod parser;
pub mod runner;

pub use context::{ContextBuilder, PromptContext};
pub use runner::{AgentOutcome, AgentRunner, ToolInvocation};
