//! Registry store: singleton registry entity per contract address.

use alloy::primitives::Address;
use tracing::{debug, info};
use vaultreg_core::types::{Registry, Release, Transaction};

use crate::store::EntityStore;

/// Get the registry at `address`, creating it anchored to `transaction` if
/// it has not been seen yet.
///
/// An existing registry is returned unmodified.
pub fn get_or_create<S: EntityStore>(
    store: &mut S,
    address: Address,
    transaction: &Transaction,
) -> Registry {
    if let Some(existing) = store.registry(address) {
        return existing;
    }

    let registry = Registry {
        address,
        created_in: transaction.id,
        latest_release_id: None,
        latest_api_version: None,
    };
    store.insert_registry(registry.clone());
    info!("Registry {} created (tx {})", address, transaction.id);
    registry
}

/// Advance the registry's latest release pointer to `release`.
///
/// The pointer never moves backwards. Returns `true` if it moved.
pub fn record_release<S: EntityStore>(store: &mut S, release: &Release) -> bool {
    let Some(registry) = store.registry(release.registry) else {
        return false;
    };
    if registry
        .latest_release_id
        .is_some_and(|latest| latest >= release.release_id)
    {
        debug!(
            "Registry {} already at release {:?}, not moving to {}",
            release.registry, registry.latest_release_id, release.release_id
        );
        return false;
    }
    store.set_registry_latest_release(release.registry, release.release_id, &release.api_version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{B256, U256};
    use vaultreg_core::types::{EventKey, Purpose, TransactionId};

    fn transaction(byte: u8, purpose: Purpose) -> Transaction {
        Transaction {
            id: TransactionId::new(B256::repeat_byte(byte), purpose),
            sender: Address::repeat_byte(0xee),
            block_number: 1,
            block_timestamp: 1_600_000_000,
            gas_price: None,
            gas_limit: None,
        }
    }

    fn release(registry: Address, release_id: u64, api_version: &str) -> Release {
        Release {
            registry,
            release_id,
            template: Address::repeat_byte(0xaa),
            api_version: api_version.to_string(),
            contract_release_id: U256::ZERO,
            created_in: transaction(0x30, Purpose::FirstNewRelease).id,
            source: EventKey::new(B256::repeat_byte(0x30), release_id),
        }
    }

    #[test]
    fn test_get_or_create_keeps_genesis_transaction() {
        let mut store = crate::store::MemoryStore::new();
        let address = Address::repeat_byte(0x01);

        let first = transaction(0x01, Purpose::FirstNewRelease);
        let second = transaction(0x02, Purpose::NewVault);

        let created = get_or_create(&mut store, address, &first);
        let existing = get_or_create(&mut store, address, &second);

        assert_eq!(created, existing);
        assert_eq!(existing.created_in, first.id);
        assert_eq!(store.graph().registries().count(), 1);
    }

    #[test]
    fn test_record_release_only_moves_forward() {
        let mut store = crate::store::MemoryStore::new();
        let address = Address::repeat_byte(0x01);
        get_or_create(&mut store, address, &transaction(0x01, Purpose::NewVault));

        assert!(record_release(&mut store, &release(address, 2, "0.2.0")));
        assert!(!record_release(&mut store, &release(address, 1, "0.1.0")));
        assert!(!record_release(&mut store, &release(address, 2, "0.2.0")));

        let registry = store.registry(address).unwrap();
        assert_eq!(registry.latest_release_id, Some(2));
        assert_eq!(registry.latest_api_version.as_deref(), Some("0.2.0"));
    }

    #[test]
    fn test_record_release_for_unknown_registry() {
        let mut store = crate::store::MemoryStore::new();
        assert!(!record_release(
            &mut store,
            &release(Address::repeat_byte(0x09), 1, "0.1.0")
        ));
    }
}
