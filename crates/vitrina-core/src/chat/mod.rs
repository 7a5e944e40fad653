//! Chat orchestration: the turn pipeline and its persistence port.

pub mod locks;
pub mod orchestrator;
pub mod repository;

pub use locks::SessionLocks;
pub use orchestrator::{ChatOrchestrator, TurnOutput};
pub use repository::ChatRepository;
