//! SQLite persistence adapters.

pub mod chat;
pub mod memory;
pub mod pool;

pub use chat::SqliteChatRepository;
pub use memory::SqliteMemoryRepository;
pub use pool::{DatabasePool, default_database_path};
