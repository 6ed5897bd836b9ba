//! Sync engine for historical and live block processing.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, info};

use super::RpcProvider;
use crate::config::SyncConfig;
use crate::reconcile::Reconciler;
use crate::storage::Storage;
use crate::store::MemoryStore;

/// Sync engine manages historical catch-up and live block synchronization.
///
/// Events are reconciled against the in-memory store; every processed range
/// ends with a checkpoint that persists the journaled changes together with
/// the new cursor.
pub struct SyncEngine {
    provider: RpcProvider,
    storage: Storage,
    config: SyncConfig,
    reconciler: Reconciler<MemoryStore>,
}

impl SyncEngine {
    /// Create a new sync engine over a store loaded from `storage`.
    pub fn new(
        provider: RpcProvider,
        storage: Storage,
        config: SyncConfig,
        store: MemoryStore,
    ) -> Self {
        Self {
            provider,
            storage,
            config,
            reconciler: Reconciler::new(store),
        }
    }

    /// Run the sync loop (historical + live).
    ///
    /// This method runs indefinitely, processing historical blocks in batches
    /// until caught up, then switching to live polling mode.
    pub async fn run(mut self) -> Result<()> {
        info!("Sync engine starting...");

        loop {
            let sync_state = self.storage.get_sync_state().await?;
            let current_block = self.provider.get_block_number().await?;
            let safe_block = current_block.saturating_sub(self.config.confirmations);
            let last_synced = sync_state.last_block_number;

            debug!(
                "Sync status: last={}, current={}, safe={}, confirmations={}",
                last_synced, current_block, safe_block, self.config.confirmations
            );

            let blocks_behind = safe_block.saturating_sub(last_synced);

            if blocks_behind == 0 {
                debug!(
                    "Caught up, waiting {} seconds for new blocks...",
                    self.config.poll_interval_secs
                );
                tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
                continue;
            }

            if blocks_behind > self.config.batch_size {
                // Historical mode
                let batch_end = last_synced + self.config.batch_size;
                info!(
                    "Historical sync: processing blocks {} to {} ({} blocks behind)",
                    last_synced + 1,
                    batch_end,
                    blocks_behind
                );
                self.sync_range(last_synced + 1, batch_end).await?;
            } else {
                // Live mode
                self.sync_range(last_synced + 1, safe_block).await?;
                tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
            }
        }
    }

    /// Fetch, reconcile and checkpoint one inclusive block range.
    pub async fn sync_range(&mut self, from_block: u64, to_block: u64) -> Result<()> {
        if from_block > to_block {
            return Ok(());
        }

        let logs = self
            .provider
            .get_logs(from_block, to_block)
            .await
            .with_context(|| {
                format!(
                    "Failed to fetch logs for blocks {} to {}",
                    from_block, to_block
                )
            })?;

        let events = self
            .provider
            .deliver(logs)
            .await
            .with_context(|| {
                format!(
                    "Failed to enrich logs for blocks {} to {}",
                    from_block, to_block
                )
            })?;

        for event in &events {
            self.reconciler.apply(event);
        }

        let changes = self.reconciler.store_mut().drain_changes();
        self.storage
            .checkpoint(&changes, to_block)
            .await
            .with_context(|| format!("Failed to checkpoint at block {}", to_block))?;

        let stats = self.reconciler.take_stats();
        if stats.events > 0 {
            info!(
                "Blocks {}-{}: {} events, {} releases, {} vaults, {} tags, {} duplicates, {} orphan tags, {} changes persisted",
                from_block,
                to_block,
                stats.events,
                stats.releases_created,
                stats.vaults_created,
                stats.tags_applied,
                stats.duplicates,
                stats.orphan_tags,
                changes.len()
            );
        } else {
            debug!("Blocks {}-{}: no registry events", from_block, to_block);
        }

        Ok(())
    }

    /// The reconciled entity store.
    pub fn store(&self) -> &MemoryStore {
        self.reconciler.store()
    }
}
