//! Entity graph storage operations.
//!
//! Entities are written from the reconciler's change journal. Insert-once
//! entities (transactions, releases) use `ON CONFLICT DO NOTHING`; registries
//! and vaults carry mutable fields and are upserted with their full state.

use super::Storage;
use alloy::primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction as SqlTransaction};
use tracing::info;
use vaultreg_core::error::CoreError;
use vaultreg_core::types::{
    Classification, EventKey, Purpose, Registry, Release, ReleaseLink, Transaction,
    TransactionId, Vault, VaultType,
};

use crate::store::{EntityChange, MemoryStore};

impl Storage {
    /// Persist journaled changes and advance the sync cursor atomically.
    ///
    /// Either every change and the new cursor are committed, or none are.
    /// Re-applying already persisted changes is harmless.
    pub async fn checkpoint(&self, changes: &[EntityChange], last_block_number: u64) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin checkpoint transaction")?;

        for change in changes {
            match change {
                EntityChange::Transaction(transaction) => {
                    Self::write_transaction(&mut tx, transaction).await?
                }
                EntityChange::Registry(registry) => Self::write_registry(&mut tx, registry).await?,
                EntityChange::Release(release) => Self::write_release(&mut tx, release).await?,
                EntityChange::Vault(vault) => Self::write_vault(&mut tx, vault).await?,
            }
        }

        Self::advance_sync_cursor(&mut tx, last_block_number).await?;

        tx.commit()
            .await
            .context("Failed to commit checkpoint transaction")?;

        Ok(())
    }

    /// Rebuild the in-memory entity store from the database.
    pub async fn load_store(&self) -> Result<MemoryStore> {
        let transactions = sqlx::query(
            r#"
            SELECT tx_hash, purpose, sender, block_number, block_timestamp, gas_price, gas_limit
            FROM transactions
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load transactions")?
        .iter()
        .map(row_to_transaction)
        .collect::<Result<Vec<_>>>()?;

        let registries = sqlx::query(
            r#"
            SELECT address, created_tx_hash, created_purpose, latest_release_id, latest_api_version
            FROM registries
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load registries")?
        .iter()
        .map(row_to_registry)
        .collect::<Result<Vec<_>>>()?;

        let releases = sqlx::query(
            r#"
            SELECT registry, release_id, template, api_version, contract_release_id,
                   created_tx_hash, created_purpose, source_tx_hash, source_log_index
            FROM releases
            ORDER BY registry, release_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load releases")?
        .iter()
        .map(row_to_release)
        .collect::<Result<Vec<_>>>()?;

        let vaults = sqlx::query(
            r#"
            SELECT address, classification, api_version, vault_type, registry,
                   release_id, release_template, created_tx_hash, created_purpose, tag
            FROM vaults
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load vaults")?
        .iter()
        .map(row_to_vault)
        .collect::<Result<Vec<_>>>()?;

        info!(
            "Loaded entity graph: {} transactions, {} registries, {} releases, {} vaults",
            transactions.len(),
            registries.len(),
            releases.len(),
            vaults.len()
        );

        Ok(MemoryStore::from_entities(
            transactions,
            registries,
            releases,
            vaults,
        ))
    }

    async fn write_transaction(
        tx: &mut SqlTransaction<'_, Sqlite>,
        transaction: &Transaction,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                tx_hash, purpose, sender, block_number, block_timestamp, gas_price, gas_limit
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tx_hash, purpose) DO NOTHING
            "#,
        )
        .bind(transaction.id.hash.as_slice())
        .bind(transaction.id.purpose.label())
        .bind(transaction.sender.as_slice())
        .bind(transaction.block_number as i64)
        .bind(transaction.block_timestamp as i64)
        .bind(transaction.gas_price.map(|v| v.to_string()))
        .bind(transaction.gas_limit.map(|v| v.to_string()))
        .execute(&mut **tx)
        .await
        .with_context(|| format!("Failed to write transaction {}", transaction.id))?;

        Ok(())
    }

    async fn write_registry(tx: &mut SqlTransaction<'_, Sqlite>, registry: &Registry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO registries (
                address, created_tx_hash, created_purpose, latest_release_id, latest_api_version
            )
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(address) DO UPDATE SET
                latest_release_id = excluded.latest_release_id,
                latest_api_version = excluded.latest_api_version
            "#,
        )
        .bind(registry.address.as_slice())
        .bind(registry.created_in.hash.as_slice())
        .bind(registry.created_in.purpose.label())
        .bind(registry.latest_release_id.map(|v| v as i64))
        .bind(registry.latest_api_version.as_deref())
        .execute(&mut **tx)
        .await
        .with_context(|| format!("Failed to write registry {}", registry.address))?;

        Ok(())
    }

    async fn write_release(tx: &mut SqlTransaction<'_, Sqlite>, release: &Release) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO releases (
                registry, release_id, template, api_version, contract_release_id,
                created_tx_hash, created_purpose, source_tx_hash, source_log_index
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(release.registry.as_slice())
        .bind(release.release_id as i64)
        .bind(release.template.as_slice())
        .bind(release.api_version.as_str())
        .bind(release.contract_release_id.to_string())
        .bind(release.created_in.hash.as_slice())
        .bind(release.created_in.purpose.label())
        .bind(release.source.tx_hash.as_slice())
        .bind(release.source.log_index as i64)
        .execute(&mut **tx)
        .await
        .with_context(|| {
            format!(
                "Failed to write release {} of registry {}",
                release.release_id, release.registry
            )
        })?;

        Ok(())
    }

    async fn write_vault(tx: &mut SqlTransaction<'_, Sqlite>, vault: &Vault) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vaults (
                address, classification, api_version, vault_type, registry,
                release_id, release_template, created_tx_hash, created_purpose, tag
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(address) DO UPDATE SET
                tag = excluded.tag
            "#,
        )
        .bind(vault.address.as_slice())
        .bind(vault.classification.as_str())
        .bind(vault.api_version.as_str())
        .bind(vault.vault_type.value().to_string())
        .bind(vault.registry.as_slice())
        .bind(vault.release.map(|link| link.release_id as i64))
        .bind(vault.release.as_ref().map(|link| link.template.as_slice()))
        .bind(vault.created_in.hash.as_slice())
        .bind(vault.created_in.purpose.label())
        .bind(vault.tag.as_deref())
        .execute(&mut **tx)
        .await
        .with_context(|| format!("Failed to write vault {}", vault.address))?;

        Ok(())
    }
}

fn address_from_bytes(bytes: &[u8]) -> Result<Address, CoreError> {
    if bytes.len() != 20 {
        return Err(CoreError::InvalidLength {
            kind: "Address",
            expected: 20,
            actual: bytes.len(),
        });
    }
    Ok(Address::from_slice(bytes))
}

fn hash_from_bytes(bytes: &[u8]) -> Result<B256, CoreError> {
    if bytes.len() != 32 {
        return Err(CoreError::InvalidLength {
            kind: "B256",
            expected: 32,
            actual: bytes.len(),
        });
    }
    Ok(B256::from_slice(bytes))
}

fn parse_u256(value: &str) -> Result<U256, CoreError> {
    value
        .parse::<U256>()
        .map_err(|_| CoreError::InvalidNumber(value.to_string()))
}

fn parse_u128(value: Option<String>) -> Result<Option<u128>, CoreError> {
    value
        .map(|v| {
            v.parse::<u128>()
                .map_err(|_| CoreError::InvalidNumber(v.clone()))
        })
        .transpose()
}

fn transaction_id(row: &SqliteRow, hash_col: &str, purpose_col: &str) -> Result<TransactionId> {
    let hash: Vec<u8> = row.get(hash_col);
    let purpose: String = row.get(purpose_col);
    Ok(TransactionId::new(
        hash_from_bytes(&hash)?,
        purpose.parse::<Purpose>()?,
    ))
}

fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
    let sender: Vec<u8> = row.get("sender");

    Ok(Transaction {
        id: transaction_id(row, "tx_hash", "purpose")?,
        sender: address_from_bytes(&sender)?,
        block_number: row.get::<i64, _>("block_number") as u64,
        block_timestamp: row.get::<i64, _>("block_timestamp") as u64,
        gas_price: parse_u128(row.get("gas_price"))?,
        gas_limit: parse_u128(row.get("gas_limit"))?,
    })
}

fn row_to_registry(row: &SqliteRow) -> Result<Registry> {
    let address: Vec<u8> = row.get("address");

    Ok(Registry {
        address: address_from_bytes(&address)?,
        created_in: transaction_id(row, "created_tx_hash", "created_purpose")?,
        latest_release_id: row
            .get::<Option<i64>, _>("latest_release_id")
            .map(|v| v as u64),
        latest_api_version: row.get("latest_api_version"),
    })
}

fn row_to_release(row: &SqliteRow) -> Result<Release> {
    let registry: Vec<u8> = row.get("registry");
    let template: Vec<u8> = row.get("template");
    let contract_release_id: String = row.get("contract_release_id");
    let source_tx_hash: Vec<u8> = row.get("source_tx_hash");

    Ok(Release {
        registry: address_from_bytes(&registry)?,
        release_id: row.get::<i64, _>("release_id") as u64,
        template: address_from_bytes(&template)?,
        api_version: row.get("api_version"),
        contract_release_id: parse_u256(&contract_release_id)?,
        created_in: transaction_id(row, "created_tx_hash", "created_purpose")?,
        source: EventKey::new(
            hash_from_bytes(&source_tx_hash)?,
            row.get::<i64, _>("source_log_index") as u64,
        ),
    })
}

fn row_to_vault(row: &SqliteRow) -> Result<Vault> {
    let address: Vec<u8> = row.get("address");
    let registry: Vec<u8> = row.get("registry");
    let classification: String = row.get("classification");
    let vault_type: String = row.get("vault_type");
    let release_id: Option<i64> = row.get("release_id");
    let release_template: Option<Vec<u8>> = row.get("release_template");

    let release = match (release_id, release_template) {
        (Some(id), Some(template)) => Some(ReleaseLink {
            release_id: id as u64,
            template: address_from_bytes(&template)?,
        }),
        (None, None) => None,
        _ => anyhow::bail!("Vault row has a partial release link"),
    };

    Ok(Vault {
        address: address_from_bytes(&address)?,
        classification: classification.parse::<Classification>()?,
        api_version: row.get("api_version"),
        vault_type: VaultType::from(parse_u256(&vault_type)?),
        registry: address_from_bytes(&registry)?,
        release,
        created_in: transaction_id(row, "created_tx_hash", "created_purpose")?,
        tag: row.get("tag"),
    })
}
