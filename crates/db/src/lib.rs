pub mod error;
pub mod models;

use std::time::Duration;

pub use error::DbError;
use sqlx::{
    Pool, Sqlite,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

/// Durable record of repositories and worktrees (spec §4.1). Thin wrapper
/// around a single-writer/multi-reader sqlite pool; every mutation below
/// runs inside its own transaction.
#[derive(Clone)]
pub struct DBService {
    pub pool: Pool<Sqlite>,
}

const OPEN_PING_BUDGET: Duration = Duration::from_secs(5);

impl DBService {
    /// Open (creating if necessary) the sqlite database at `path` and run
    /// pending migrations.
    pub async fn connect(path: &str) -> Result<Self, DbError> {
        let is_memory = path == ":memory:";
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let max_connections = if is_memory { 1 } else { 5 };
        let pool = tokio::time::timeout(
            OPEN_PING_BUDGET,
            SqlitePoolOptions::new()
                .max_connections(max_connections)
                .connect_with(options),
        )
        .await
        .map_err(|_| sqlx::Error::PoolTimedOut)??;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!(%path, "database connected and migrated");
        Ok(Self { pool })
    }

    /// In-memory database, used by tests and by `reconciliation` dry-runs.
    /// A single pooled connection keeps the whole pool on the same private
    /// in-memory database instead of each connection getting its own.
    pub async fn connect_in_memory() -> Result<Self, DbError> {
        Self::connect(":memory:").await
    }
}
