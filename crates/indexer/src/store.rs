//! Entity store used by the reconciliation core.
//!
//! [`EntityStore`] is the narrow persistence interface the reconcilers
//! consume: point lookup by identity, insert-if-absent, and field update by
//! identity. All methods are synchronous so an event handler always reads
//! its own writes.
//!
//! [`MemoryStore`] is the indexed in-memory implementation. Every successful
//! write is appended to a change journal that the sync engine drains into
//! durable storage at checkpoints.

use alloy::primitives::Address;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use vaultreg_core::types::{EventKey, Registry, Release, Transaction, TransactionId, Vault};

/// Narrow persistence interface of the entity graph.
///
/// `insert_*` methods have insert-if-absent semantics and return `true` only
/// when the entity was actually inserted. `set_*` methods update a single
/// field of an existing entity and return `false` if it does not exist.
pub trait EntityStore {
    /// Look up a transaction record.
    fn transaction(&self, id: &TransactionId) -> Option<Transaction>;

    /// Insert a transaction record if absent.
    fn insert_transaction(&mut self, transaction: Transaction) -> bool;

    /// Look up a registry by address.
    fn registry(&self, address: Address) -> Option<Registry>;

    /// Insert a registry if absent.
    fn insert_registry(&mut self, registry: Registry) -> bool;

    /// Update the latest release pointer of a registry.
    fn set_registry_latest_release(
        &mut self,
        address: Address,
        release_id: u64,
        api_version: &str,
    ) -> bool;

    /// Look up a release by its per-registry id.
    fn release(&self, registry: Address, release_id: u64) -> Option<Release>;

    /// Look up a release by the log that produced it.
    fn release_by_source(&self, source: &EventKey) -> Option<Release>;

    /// Number of releases recorded for a registry.
    fn release_count(&self, registry: Address) -> u64;

    /// Insert a release if absent.
    fn insert_release(&mut self, release: Release) -> bool;

    /// Look up a vault by address.
    fn vault(&self, address: Address) -> Option<Vault>;

    /// Insert a vault if absent.
    fn insert_vault(&mut self, vault: Vault) -> bool;

    /// Overwrite the tag of an existing vault.
    fn set_vault_tag(&mut self, address: Address, tag: &str) -> bool;
}

/// A journaled write, carrying the full post-write state of the entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityChange {
    /// New transaction record.
    Transaction(Transaction),
    /// New or updated registry.
    Registry(Registry),
    /// New release.
    Release(Release),
    /// New or re-tagged vault.
    Vault(Vault),
}

/// The reconciled entity graph.
///
/// Ordered maps keep iteration (and therefore dumps) deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityGraph {
    transactions: BTreeMap<TransactionId, Transaction>,
    registries: BTreeMap<Address, Registry>,
    releases: BTreeMap<(Address, u64), Release>,
    vaults: BTreeMap<Address, Vault>,
}

impl EntityGraph {
    /// All transaction records.
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values()
    }

    /// All registries.
    pub fn registries(&self) -> impl Iterator<Item = &Registry> {
        self.registries.values()
    }

    /// All releases, ordered by registry then release id.
    pub fn releases(&self) -> impl Iterator<Item = &Release> {
        self.releases.values()
    }

    /// Releases of one registry in release id order.
    pub fn releases_of(&self, registry: Address) -> impl Iterator<Item = &Release> {
        self.releases
            .range((registry, 0)..=(registry, u64::MAX))
            .map(|(_, release)| release)
    }

    /// All vaults.
    pub fn vaults(&self) -> impl Iterator<Item = &Vault> {
        self.vaults.values()
    }

    /// Serializable view of the whole graph.
    pub fn dump(&self) -> GraphDump<'_> {
        GraphDump {
            transactions: self.transactions().collect(),
            registries: self.registries().collect(),
            releases: self.releases().collect(),
            vaults: self.vaults().collect(),
        }
    }
}

/// JSON-friendly listing of an [`EntityGraph`].
#[derive(Debug, Serialize)]
pub struct GraphDump<'a> {
    /// Transaction records.
    pub transactions: Vec<&'a Transaction>,
    /// Registries.
    pub registries: Vec<&'a Registry>,
    /// Releases.
    pub releases: Vec<&'a Release>,
    /// Vaults.
    pub vaults: Vec<&'a Vault>,
}

/// In-memory [`EntityStore`] with a change journal.
#[derive(Debug, Default)]
pub struct MemoryStore {
    graph: EntityGraph,
    release_sources: HashMap<EventKey, (Address, u64)>,
    journal: Vec<EntityChange>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from previously persisted entities.
    ///
    /// The journal starts empty: loaded entities are already durable.
    pub fn from_entities(
        transactions: Vec<Transaction>,
        registries: Vec<Registry>,
        releases: Vec<Release>,
        vaults: Vec<Vault>,
    ) -> Self {
        let mut store = Self::new();
        for transaction in transactions {
            store.graph.transactions.insert(transaction.id, transaction);
        }
        for registry in registries {
            store.graph.registries.insert(registry.address, registry);
        }
        for release in releases {
            store
                .release_sources
                .insert(release.source, (release.registry, release.release_id));
            store
                .graph
                .releases
                .insert((release.registry, release.release_id), release);
        }
        for vault in vaults {
            store.graph.vaults.insert(vault.address, vault);
        }
        store
    }

    /// The current entity graph.
    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }

    /// Number of journaled changes not yet drained.
    pub fn pending_changes(&self) -> usize {
        self.journal.len()
    }

    /// Take all journaled changes, leaving the journal empty.
    pub fn drain_changes(&mut self) -> Vec<EntityChange> {
        std::mem::take(&mut self.journal)
    }
}

impl EntityStore for MemoryStore {
    fn transaction(&self, id: &TransactionId) -> Option<Transaction> {
        self.graph.transactions.get(id).cloned()
    }

    fn insert_transaction(&mut self, transaction: Transaction) -> bool {
        if self.graph.transactions.contains_key(&transaction.id) {
            return false;
        }
        self.journal.push(EntityChange::Transaction(transaction.clone()));
        self.graph.transactions.insert(transaction.id, transaction);
        true
    }

    fn registry(&self, address: Address) -> Option<Registry> {
        self.graph.registries.get(&address).cloned()
    }

    fn insert_registry(&mut self, registry: Registry) -> bool {
        if self.graph.registries.contains_key(&registry.address) {
            return false;
        }
        self.journal.push(EntityChange::Registry(registry.clone()));
        self.graph.registries.insert(registry.address, registry);
        true
    }

    fn set_registry_latest_release(
        &mut self,
        address: Address,
        release_id: u64,
        api_version: &str,
    ) -> bool {
        let Some(registry) = self.graph.registries.get_mut(&address) else {
            return false;
        };
        registry.latest_release_id = Some(release_id);
        registry.latest_api_version = Some(api_version.to_string());
        self.journal.push(EntityChange::Registry(registry.clone()));
        true
    }

    fn release(&self, registry: Address, release_id: u64) -> Option<Release> {
        self.graph.releases.get(&(registry, release_id)).cloned()
    }

    fn release_by_source(&self, source: &EventKey) -> Option<Release> {
        let key = self.release_sources.get(source)?;
        self.graph.releases.get(key).cloned()
    }

    fn release_count(&self, registry: Address) -> u64 {
        self.graph.releases_of(registry).count() as u64
    }

    fn insert_release(&mut self, release: Release) -> bool {
        let key = (release.registry, release.release_id);
        if self.graph.releases.contains_key(&key)
            || self.release_sources.contains_key(&release.source)
        {
            return false;
        }
        self.release_sources.insert(release.source, key);
        self.journal.push(EntityChange::Release(release.clone()));
        self.graph.releases.insert(key, release);
        true
    }

    fn vault(&self, address: Address) -> Option<Vault> {
        self.graph.vaults.get(&address).cloned()
    }

    fn insert_vault(&mut self, vault: Vault) -> bool {
        if self.graph.vaults.contains_key(&vault.address) {
            return false;
        }
        self.journal.push(EntityChange::Vault(vault.clone()));
        self.graph.vaults.insert(vault.address, vault);
        true
    }

    fn set_vault_tag(&mut self, address: Address, tag: &str) -> bool {
        let Some(vault) = self.graph.vaults.get_mut(&address) else {
            return false;
        };
        vault.tag = Some(tag.to_string());
        self.journal.push(EntityChange::Vault(vault.clone()));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{B256, U256};
    use vaultreg_core::types::{Classification, Purpose, VaultType};

    fn tx_id() -> TransactionId {
        TransactionId::new(B256::repeat_byte(0x11), Purpose::NewVault)
    }

    fn sample_vault(address: Address) -> Vault {
        Vault {
            address,
            classification: Classification::Endorsed,
            api_version: "0.4.3".to_string(),
            vault_type: VaultType::LEGACY,
            registry: Address::repeat_byte(0x01),
            release: None,
            created_in: tx_id(),
            tag: None,
        }
    }

    fn sample_release(registry: Address, release_id: u64, log_index: u64) -> Release {
        Release {
            registry,
            release_id,
            template: Address::repeat_byte(0xaa),
            api_version: format!("0.{}.0", release_id),
            contract_release_id: U256::from(release_id - 1),
            created_in: TransactionId::new(B256::repeat_byte(0x22), Purpose::FirstNewRelease),
            source: EventKey::new(B256::repeat_byte(0x22), log_index),
        }
    }

    #[test]
    fn test_insert_vault_is_insert_if_absent() {
        let mut store = MemoryStore::new();
        let address = Address::repeat_byte(0x05);

        assert!(store.insert_vault(sample_vault(address)));

        let mut other = sample_vault(address);
        other.api_version = "9.9.9".to_string();
        assert!(!store.insert_vault(other));

        assert_eq!(store.vault(address).unwrap().api_version, "0.4.3");
        assert_eq!(store.pending_changes(), 1);
    }

    #[test]
    fn test_set_vault_tag_requires_existing_vault() {
        let mut store = MemoryStore::new();
        let address = Address::repeat_byte(0x05);

        assert!(!store.set_vault_tag(address, "ignored"));
        assert_eq!(store.pending_changes(), 0);

        store.insert_vault(sample_vault(address));
        assert!(store.set_vault_tag(address, "core"));
        assert_eq!(store.vault(address).unwrap().tag.as_deref(), Some("core"));
    }

    #[test]
    fn test_release_count_is_per_registry() {
        let mut store = MemoryStore::new();
        let r1 = Address::repeat_byte(0x01);
        let r2 = Address::repeat_byte(0x02);

        store.insert_release(sample_release(r1, 1, 0));
        store.insert_release(sample_release(r1, 2, 1));
        store.insert_release(sample_release(r2, 1, 2));

        assert_eq!(store.release_count(r1), 2);
        assert_eq!(store.release_count(r2), 1);
        assert_eq!(store.release_count(Address::ZERO), 0);
    }

    #[test]
    fn test_release_source_is_unique() {
        let mut store = MemoryStore::new();
        let r1 = Address::repeat_byte(0x01);

        assert!(store.insert_release(sample_release(r1, 1, 7)));
        assert!(!store.insert_release(sample_release(r1, 2, 7)));

        let source = EventKey::new(B256::repeat_byte(0x22), 7);
        assert_eq!(store.release_by_source(&source).unwrap().release_id, 1);
    }

    #[test]
    fn test_drain_changes_empties_journal() {
        let mut store = MemoryStore::new();
        store.insert_vault(sample_vault(Address::repeat_byte(0x05)));
        store.set_vault_tag(Address::repeat_byte(0x05), "a");

        let changes = store.drain_changes();
        assert_eq!(changes.len(), 2);
        assert!(matches!(&changes[1], EntityChange::Vault(v) if v.tag.as_deref() == Some("a")));
        assert_eq!(store.pending_changes(), 0);
    }

    #[test]
    fn test_from_entities_rebuilds_indexes() {
        let r1 = Address::repeat_byte(0x01);
        let release = sample_release(r1, 1, 3);
        let store = MemoryStore::from_entities(vec![], vec![], vec![release.clone()], vec![]);

        assert_eq!(store.release_by_source(&release.source), Some(release));
        assert_eq!(store.pending_changes(), 0);
    }
}
