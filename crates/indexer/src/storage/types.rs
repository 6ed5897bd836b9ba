//! Database types for the indexer storage layer.

use serde::Serialize;

/// Sync state record (singleton).
///
/// Tracks the indexer's progress through the blockchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    /// Last block whose events are fully checkpointed
    pub last_block_number: u64,

    /// Unix timestamp of last update
    pub updated_at: i64,

    /// Chain ID (for safety)
    pub chain_id: u64,
}

/// Database statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseStats {
    /// Number of transaction records
    pub transaction_count: u64,

    /// Number of registries
    pub registry_count: u64,

    /// Number of releases
    pub release_count: u64,

    /// Number of vaults
    pub vault_count: u64,

    /// Number of tagged vaults
    pub tagged_vault_count: u64,

    /// Last processed block number
    pub last_block_number: u64,
}
