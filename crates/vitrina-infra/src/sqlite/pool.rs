//! SQLite connection management.
//!
//! Reads and writes go through separate pools over the same database
//! file: up to [`READER_CONNECTIONS`] read-only connections for SELECTs
//! and a single read-write connection that serializes every mutation.
//! WAL mode keeps readers from blocking behind the writer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

const READER_CONNECTIONS: u32 = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Split read/write pool pair for one SQLite database.
#[derive(Clone)]
pub struct DatabasePool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open the database at `path`, creating the file and any missing
    /// parent directories, and run pending migrations on the writer
    /// before the reader pool comes up.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, sqlx::Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await?;
        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(READER_CONNECTIONS)
            .connect_with(options.create_if_missing(false).read_only(true))
            .await?;

        Ok(Self { reader, writer })
    }
}

/// Database file location: `$VITRINA_DATA_DIR/vitrina.db`, falling back
/// to `~/.vitrina/vitrina.db`.
pub fn default_database_path() -> PathBuf {
    std::env::var("VITRINA_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            Path::new(&home).join(".vitrina")
        })
        .join("vitrina.db")
}
