//! Sync state storage operations.

use super::{Storage, SyncState};
use anyhow::{Context, Result};
use sqlx::{Row, Sqlite, Transaction};

impl Storage {
    /// Get the current sync state.
    pub async fn get_sync_state(&self) -> Result<SyncState> {
        let row = sqlx::query(
            r#"
            SELECT last_block_number, updated_at, chain_id
            FROM sync_state
            WHERE id = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to fetch sync state")?;

        Ok(SyncState {
            last_block_number: row.get::<i64, _>("last_block_number") as u64,
            updated_at: row.get("updated_at"),
            chain_id: row.get::<i64, _>("chain_id") as u64,
        })
    }

    /// Initialize sync state for a new chain.
    pub async fn initialize_sync_state(&self, chain_id: u64, start_block: u64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE sync_state
            SET last_block_number = ?,
                updated_at = ?,
                chain_id = ?
            WHERE id = 1
            "#,
        )
        .bind(start_block as i64)
        .bind(now)
        .bind(chain_id as i64)
        .execute(&self.pool)
        .await
        .context("Failed to initialize sync state")?;

        Ok(())
    }

    /// Advance the sync cursor inside an open transaction.
    pub(crate) async fn advance_sync_cursor(
        tx: &mut Transaction<'_, Sqlite>,
        last_block_number: u64,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE sync_state
            SET last_block_number = ?,
                updated_at = ?
            WHERE id = 1
            "#,
        )
        .bind(last_block_number as i64)
        .bind(now)
        .execute(&mut **tx)
        .await
        .context("Failed to advance sync cursor")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    async fn setup_storage() -> (Storage, NamedTempFile) {
        let temp_db = NamedTempFile::new().unwrap();
        let storage = Storage::new_with_path(temp_db.path(), None, None)
            .await
            .unwrap();
        storage.run_migrations().await.unwrap();
        (storage, temp_db)
    }

    #[tokio::test]
    async fn test_sync_state_operations() {
        let (storage, _temp_db) = setup_storage().await;

        // Initial state (created by migration)
        let state = storage.get_sync_state().await.unwrap();
        assert_eq!(state.last_block_number, 0);
        assert_eq!(state.chain_id, 0);

        storage.initialize_sync_state(1, 11_563_000).await.unwrap();

        let state = storage.get_sync_state().await.unwrap();
        assert_eq!(state.last_block_number, 11_563_000);
        assert_eq!(state.chain_id, 1);

        let mut tx = storage.pool().begin().await.unwrap();
        Storage::advance_sync_cursor(&mut tx, 11_564_000)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let state = storage.get_sync_state().await.unwrap();
        assert_eq!(state.last_block_number, 11_564_000);
        assert_eq!(state.chain_id, 1);

        storage.close().await;
    }
}
