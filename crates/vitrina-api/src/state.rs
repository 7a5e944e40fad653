//! Application state wiring all services together.
//!
//! The orchestrator is generic over its repositories; AppState pins it
//! to the concrete SQLite implementations.

use std::sync::Arc;

use secrecy::SecretString;

use vitrina_core::chat::ChatOrchestrator;
use vitrina_core::llm::BoxLlmProvider;
use vitrina_infra::catalog::{CatalogClient, catalog_tools};
use vitrina_infra::llm::AnthropicProvider;
use vitrina_infra::sqlite::{
    DatabasePool, SqliteChatRepository, SqliteMemoryRepository, default_database_path,
};
use vitrina_types::config::VitrinaConfig;

/// Orchestrator pinned to the SQLite repositories.
pub type ConcreteOrchestrator = ChatOrchestrator<SqliteChatRepository, SqliteMemoryRepository>;

/// Shared application state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ConcreteOrchestrator>,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Initialize the application state: connect to the database, build
    /// the provider and tools, wire the orchestrator.
    pub async fn init(config: VitrinaConfig) -> anyhow::Result<Self> {
        let db_pool = DatabasePool::open(default_database_path()).await?;

        let api_key = std::env::var("VITRINA_ANTHROPIC_API_KEY")
            .map(SecretString::from)
            .map_err(|_| anyhow::anyhow!("VITRINA_ANTHROPIC_API_KEY is not set"))?;
        let provider = BoxLlmProvider::new(AnthropicProvider::new(api_key)?);

        let catalog = Arc::new(CatalogClient::new(&config.catalog)?);
        let tools = catalog_tools(catalog);

        let orchestrator = ChatOrchestrator::new(
            SqliteChatRepository::new(db_pool.clone()),
            SqliteMemoryRepository::new(db_pool.clone()),
            provider,
            tools,
            config,
        );

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            db_pool,
        })
    }
}
