//! MemoryRepository trait definition.
//!
//! Follows the same RPITIT pattern as ChatRepository.

use uuid::Uuid;
use vitrina_types::error::RepositoryError;
use vitrina_types::memory::{MemoryFact, MemoryType};

/// Repository trait for per-user memory fact persistence.
///
/// Implementations live in vitrina-infra (e.g., `SqliteMemoryRepository`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait MemoryRepository: Send + Sync {
    /// Insert or overwrite a fact. Facts are unique per
    /// (user_id, memory_type, key); a second upsert for the same triple
    /// replaces the value (last write wins).
    fn upsert_fact(
        &self,
        fact: &MemoryFact,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All facts for a user, most recently updated first.
    fn get_facts(
        &self,
        user_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<MemoryFact>, RepositoryError>> + Send;

    /// Delete one fact by its (type, key) coordinates.
    fn delete_fact(
        &self,
        user_id: &Uuid,
        memory_type: MemoryType,
        key: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete every fact of a given type for a user. Returns the count.
    fn delete_facts_by_type(
        &self,
        user_id: &Uuid,
        memory_type: MemoryType,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
