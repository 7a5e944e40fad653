//! Business logic for Vitrina.
//!
//! This crate defines the repository and provider traits (ports) and the
//! conversation machinery built on top of them: the chat orchestrator,
//! the agent loop, prompt context assembly, response parsing, and memory
//! management. Implementations of the ports live in vitrina-infra; this
//! crate never depends on database or HTTP libraries.

pub mod agent;
pub mod chat;
pub mod llm;
pub mod memory;
pub mod tool;
