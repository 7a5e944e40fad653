//! Cross-session memory: repository trait and merge policy.

pub mod manager;
pub mod store;

pub use manager::MemoryManager;
pub use store::MemoryRepository;
