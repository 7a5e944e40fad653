//! Shared domain types for Vitrina.
//!
//! This crate holds the plain data shapes used across the workspace:
//! users, chat sessions and messages, content blocks, memory facts,
//! LLM request/response types, configuration, and the error taxonomy.
//! No IO and no async here.

pub mod chat;
pub mod config;
pub mod content;
pub mod error;
pub mod llm;
pub mod memory;
pub mod user;
