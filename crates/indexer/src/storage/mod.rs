//! Storage layer for the vault registry indexer.
//!
//! This module provides database operations for:
//! - Entities (transactions, registries, releases, vaults)
//! - Sync state (indexer progress tracking)
//!
//! The reconciler works on an in-memory [`MemoryStore`](crate::store::MemoryStore);
//! this layer only loads it on start and persists its journal at checkpoints.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub mod entities;
pub mod sync;
pub mod types;

pub use types::*;

/// Database storage for the indexer.
///
/// Provides async access to SQLite database with connection pooling.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance with the given database URL.
    ///
    /// This will create the database file if it doesn't exist. Pool bounds
    /// default to 5 max / 1 min connections.
    ///
    /// # Example
    /// ```no_run
    /// # use vaultreg_indexer::storage::Storage;
    /// # async fn example() -> anyhow::Result<()> {
    /// let storage = Storage::new("sqlite://vaultreg.db", None, None).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(
        database_url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        info!("Connecting to database: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.unwrap_or(5))
            .min_connections(min_connections.unwrap_or(1))
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// Create a new storage instance with a specific file path.
    pub async fn new_with_path<P: AsRef<Path>>(
        path: P,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let database_url = format!("sqlite://{}", path.display());
        Self::new(&database_url, max_connections, min_connections).await
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Migrations completed successfully");

        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection");
        self.pool.close().await;
    }

    /// Get database statistics.
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let transaction_count = self.count("SELECT COUNT(*) FROM transactions").await?;
        let registry_count = self.count("SELECT COUNT(*) FROM registries").await?;
        let release_count = self.count("SELECT COUNT(*) FROM releases").await?;
        let vault_count = self.count("SELECT COUNT(*) FROM vaults").await?;
        let tagged_vault_count = self
            .count("SELECT COUNT(*) FROM vaults WHERE tag IS NOT NULL")
            .await?;

        let sync_state = self.get_sync_state().await?;

        Ok(DatabaseStats {
            transaction_count,
            registry_count,
            release_count,
            vault_count,
            tagged_vault_count,
            last_block_number: sync_state.last_block_number,
        })
    }

    /// Check database health.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;

        Ok(())
    }

    async fn count(&self, sql: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(sql)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to run count query: {}", sql))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_storage_creation() {
        let temp_db = NamedTempFile::new().unwrap();

        let storage = Storage::new_with_path(temp_db.path(), None, None)
            .await
            .unwrap();
        storage.run_migrations().await.unwrap();

        storage.health_check().await.unwrap();

        storage.close().await;
    }

    #[tokio::test]
    async fn test_database_stats_empty() {
        let temp_db = NamedTempFile::new().unwrap();

        let storage = Storage::new_with_path(temp_db.path(), None, None)
            .await
            .unwrap();
        storage.run_migrations().await.unwrap();

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.transaction_count, 0);
        assert_eq!(stats.registry_count, 0);
        assert_eq!(stats.release_count, 0);
        assert_eq!(stats.vault_count, 0);
        assert_eq!(stats.tagged_vault_count, 0);
        assert_eq!(stats.last_block_number, 0);

        storage.close().await;
    }
}
