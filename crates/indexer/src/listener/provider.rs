//! RPC provider wrapper for Ethereum communication.

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{Filter, Log};
use alloy::transports::http::{Client, Http};
use anyhow::{Context, Result};
use std::collections::HashMap;
use tracing::debug;

use super::events::{RegistryKind, RegistryLog};
use crate::config::RegistrySource;
use crate::mapping::DeliveredEvent;

/// Sender and gas data of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionMeta {
    /// `tx.from`
    pub from: Address,
    /// Gas price in wei (legacy transactions).
    pub gas_price: Option<u128>,
    /// Gas limit.
    pub gas_limit: Option<u128>,
}

/// HTTP RPC provider for querying registry events.
#[derive(Clone)]
pub struct RpcProvider {
    provider: RootProvider<Http<Client>>,
    sources: HashMap<Address, RegistryKind>,
}

impl RpcProvider {
    /// Create a new RPC provider watching `sources`.
    pub async fn new(rpc_url: &str, sources: &[RegistrySource]) -> Result<Self> {
        let url = rpc_url
            .parse()
            .with_context(|| format!("Invalid RPC URL: {}", rpc_url))?;

        let provider = ProviderBuilder::new().on_http(url);

        Ok(Self {
            provider,
            sources: sources
                .iter()
                .map(|source| (source.address, source.kind))
                .collect(),
        })
    }

    /// Get the latest block number.
    pub async fn get_block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .context("Failed to get block number")
    }

    /// Get the chain id reported by the node.
    pub async fn get_chain_id(&self) -> Result<u64> {
        self.provider
            .get_chain_id()
            .await
            .context("Failed to get chain id")
    }

    /// Get decoded registry logs for a block range, in chain order.
    pub async fn get_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<RegistryLog>> {
        let mut signatures: Vec<B256> = self
            .sources
            .values()
            .flat_map(|kind| kind.signatures())
            .collect();
        signatures.sort();
        signatures.dedup();

        let filter = Filter::new()
            .address(self.sources.keys().copied().collect::<Vec<_>>())
            .event_signature(signatures)
            .from_block(from_block)
            .to_block(to_block);

        let logs: Vec<Log> = self
            .provider
            .get_logs(&filter)
            .await
            .context("Failed to fetch logs from RPC")?;

        let mut events = Vec::new();
        for log in &logs {
            if log.removed {
                continue;
            }
            let Some(kind) = self.sources.get(&log.inner.address) else {
                continue;
            };
            // A decode failure here means the configured kind is wrong.
            if let Some(event) = RegistryLog::from_log(*kind, log)? {
                events.push(event);
            }
        }

        events.sort_by_key(RegistryLog::coordinates);
        Ok(events)
    }

    /// Get the timestamp of a block.
    pub async fn get_block_timestamp(&self, block_number: u64) -> Result<u64> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(block_number), false)
            .await
            .with_context(|| format!("Failed to fetch block {}", block_number))?
            .with_context(|| format!("Block {} not found", block_number))?;

        Ok(block.header.timestamp)
    }

    /// Get the sender and gas data of a transaction.
    pub async fn get_transaction_meta(&self, tx_hash: B256) -> Result<TransactionMeta> {
        let tx = self
            .provider
            .get_transaction_by_hash(tx_hash)
            .await
            .with_context(|| format!("Failed to fetch transaction {}", tx_hash))?
            .with_context(|| format!("Transaction {} not found", tx_hash))?;

        Ok(TransactionMeta {
            from: tx.from,
            gas_price: tx.gas_price.map(u128::from),
            gas_limit: Some(u128::from(tx.gas)),
        })
    }

    /// Attach transaction context to decoded logs.
    ///
    /// Block timestamps and transactions are fetched once per batch.
    pub async fn deliver(&self, logs: Vec<RegistryLog>) -> Result<Vec<DeliveredEvent>> {
        let mut timestamps: HashMap<u64, u64> = HashMap::new();
        let mut transactions: HashMap<B256, TransactionMeta> = HashMap::new();
        let mut delivered = Vec::with_capacity(logs.len());

        for log in logs {
            let timestamp = match log.block_timestamp {
                Some(ts) => ts,
                None => match timestamps.get(&log.block_number) {
                    Some(ts) => *ts,
                    None => {
                        let ts = self.get_block_timestamp(log.block_number).await?;
                        timestamps.insert(log.block_number, ts);
                        ts
                    }
                },
            };

            let meta = match transactions.get(&log.tx_hash) {
                Some(meta) => *meta,
                None => {
                    let meta = self.get_transaction_meta(log.tx_hash).await?;
                    transactions.insert(log.tx_hash, meta);
                    meta
                }
            };

            debug!(
                "Delivering {} from {} at block {} log {}",
                log.event.name(),
                log.address,
                log.block_number,
                log.log_index
            );
            delivered.push(log.into_delivered(
                timestamp,
                meta.from,
                meta.gas_price,
                meta.gas_limit,
            ));
        }

        Ok(delivered)
    }
}
