//! SQLite memory repository implementation.
//!
//! Implements `MemoryRepository` from `vitrina-core`. Facts are keyed on
//! (user_id, memory_type, key) and upserts are last-write-wins via
//! `ON CONFLICT DO UPDATE`.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use vitrina_core::memory::MemoryRepository;
use vitrina_types::error::RepositoryError;
use vitrina_types::memory::{MemoryFact, MemoryType};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `MemoryRepository`.
pub struct SqliteMemoryRepository {
    pool: DatabasePool,
}

impl SqliteMemoryRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Internal row type for mapping SQLite rows to domain MemoryFact.
struct MemoryFactRow {
    id: String,
    user_id: String,
    memory_type: String,
    key: String,
    value: String,
    confidence: f64,
    source: String,
    created_at: String,
    updated_at: String,
}

impl MemoryFactRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            memory_type: row.try_get("memory_type")?,
            key: row.try_get("key")?,
            value: row.try_get("value")?,
            confidence: row.try_get("confidence")?,
            source: row.try_get("source")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_fact(self) -> Result<MemoryFact, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid fact id: {e}")))?;
        let user_id = Uuid::parse_str(&self.user_id)
            .map_err(|e| RepositoryError::Query(format!("invalid user_id: {e}")))?;
        let memory_type = self
            .memory_type
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let source = self
            .source
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(MemoryFact {
            id,
            user_id,
            memory_type,
            key: self.key,
            value: self.value,
            confidence: self.confidence,
            source,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

impl MemoryRepository for SqliteMemoryRepository {
    async fn upsert_fact(&self, fact: &MemoryFact) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO memory_facts (id, user_id, memory_type, key, value, confidence, source, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (user_id, memory_type, key) DO UPDATE SET
                   value = excluded.value,
                   confidence = excluded.confidence,
                   source = excluded.source,
                   updated_at = excluded.updated_at"#,
        )
        .bind(fact.id.to_string())
        .bind(fact.user_id.to_string())
        .bind(fact.memory_type.to_string())
        .bind(&fact.key)
        .bind(&fact.value)
        .bind(fact.confidence)
        .bind(fact.source.to_string())
        .bind(format_datetime(&fact.created_at))
        .bind(format_datetime(&fact.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get_facts(&self, user_id: &Uuid) -> Result<Vec<MemoryFact>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM memory_facts WHERE user_id = ? ORDER BY memory_type, key",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut facts = Vec::with_capacity(rows.len());
        for row in &rows {
            let fact_row = MemoryFactRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            facts.push(fact_row.into_fact()?);
        }

        Ok(facts)
    }

    async fn delete_fact(
        &self,
        user_id: &Uuid,
        memory_type: MemoryType,
        key: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM memory_facts WHERE user_id = ? AND memory_type = ? AND key = ?",
        )
        .bind(user_id.to_string())
        .bind(memory_type.to_string())
        .bind(key)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn delete_facts_by_type(
        &self,
        user_id: &Uuid,
        memory_type: MemoryType,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM memory_facts WHERE user_id = ? AND memory_type = ?",
        )
        .bind(user_id.to_string())
        .bind(memory_type.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrina_types::memory::{MemorySource, keys};
    use vitrina_types::user::User;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        DatabasePool::open(&db_path).await.unwrap()
    }

    async fn setup_user(pool: &DatabasePool) -> Uuid {
        let user = User::new("test-user");
        sqlx::query(
            "INSERT INTO users (id, external_id, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user.id.to_string())
        .bind(&user.external_id)
        .bind(user.created_at.to_rfc3339())
        .bind(user.updated_at.to_rfc3339())
        .execute(&pool.writer)
        .await
        .unwrap();
        user.id
    }

    fn fact(user_id: Uuid, memory_type: MemoryType, key: &str, value: &str) -> MemoryFact {
        MemoryFact::new(user_id, memory_type, key, value, MemorySource::Conversation)
    }

    #[tokio::test]
    async fn test_upsert_and_get_facts() {
        let pool = test_pool().await;
        let repo = SqliteMemoryRepository::new(pool.clone());
        let user_id = setup_user(&pool).await;

        repo.upsert_fact(&fact(user_id, MemoryType::Personal, keys::DISPLAY_NAME, "Ada"))
            .await
            .unwrap();
        repo.upsert_fact(&fact(
            user_id,
            MemoryType::Preference,
            keys::PREFERRED_VIEW,
            "table",
        ))
        .await
        .unwrap();

        let facts = repo.get_facts(&user_id).await.unwrap();
        assert_eq!(facts.len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_on_conflict() {
        let pool = test_pool().await;
        let repo = SqliteMemoryRepository::new(pool.clone());
        let user_id = setup_user(&pool).await;

        repo.upsert_fact(&fact(user_id, MemoryType::Personal, keys::DISPLAY_NAME, "Ada"))
            .await
            .unwrap();
        repo.upsert_fact(&MemoryFact::new(
            user_id,
            MemoryType::Personal,
            keys::DISPLAY_NAME,
            "Blake",
            MemorySource::Assistant,
        ))
        .await
        .unwrap();

        let facts = repo.get_facts(&user_id).await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].value, "Blake");
        assert_eq!(facts[0].source, MemorySource::Assistant);
    }

    #[tokio::test]
    async fn test_same_key_distinct_per_type() {
        let pool = test_pool().await;
        let repo = SqliteMemoryRepository::new(pool.clone());
        let user_id = setup_user(&pool).await;

        repo.upsert_fact(&fact(user_id, MemoryType::Preference, "mode", "a"))
            .await
            .unwrap();
        repo.upsert_fact(&fact(user_id, MemoryType::Intent, "mode", "b"))
            .await
            .unwrap();

        let facts = repo.get_facts(&user_id).await.unwrap();
        assert_eq!(facts.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_fact() {
        let pool = test_pool().await;
        let repo = SqliteMemoryRepository::new(pool.clone());
        let user_id = setup_user(&pool).await;

        repo.upsert_fact(&fact(user_id, MemoryType::Personal, keys::DISPLAY_NAME, "Ada"))
            .await
            .unwrap();
        repo.delete_fact(&user_id, MemoryType::Personal, keys::DISPLAY_NAME)
            .await
            .unwrap();

        assert!(repo.get_facts(&user_id).await.unwrap().is_empty());

        let err = repo
            .delete_fact(&user_id, MemoryType::Personal, keys::DISPLAY_NAME)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_facts_by_type() {
        let pool = test_pool().await;
        let repo = SqliteMemoryRepository::new(pool.clone());
        let user_id = setup_user(&pool).await;

        repo.upsert_fact(&fact(user_id, MemoryType::Personal, keys::DISPLAY_NAME, "Ada"))
            .await
            .unwrap();
        repo.upsert_fact(&fact(user_id, MemoryType::Personal, keys::TIMEZONE, "UTC"))
            .await
            .unwrap();
        repo.upsert_fact(&fact(
            user_id,
            MemoryType::Preference,
            keys::PREFERRED_VIEW,
            "grid",
        ))
        .await
        .unwrap();

        let deleted = repo
            .delete_facts_by_type(&user_id, MemoryType::Personal)
            .await
            .unwrap();
        assert_eq!(deleted, 2);

        let facts = repo.get_facts(&user_id).await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].memory_type, MemoryType::Preference);
    }
}
