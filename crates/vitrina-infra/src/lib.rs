//! Infrastructure implementations for Vitrina.
//!
//! Concrete adapters behind the vitrina-core ports: SQLite repositories,
//! the Anthropic model provider, and the catalog HTTP client with its
//! tool implementations.

pub mod catalog;
pub mod llm;
pub mod sqlite;
