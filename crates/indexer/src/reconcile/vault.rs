//! Vault lifecycle engine.

use alloy::primitives::Address;
use tracing::{debug, info, warn};
use vaultreg_core::types::{
    Classification, Registry, TemplatePolicy, Transaction, Vault, VaultType,
};

use super::release::latest_release;
use crate::store::EntityStore;

/// Result of [`create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultOutcome {
    /// The new or previously recorded vault.
    pub vault: Vault,
    /// `false` when a vault already existed at this address.
    pub created: bool,
}

/// Result of [`tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOutcome {
    /// Tag written.
    Applied,
    /// No vault at the address; nothing changed.
    UnknownVault,
}

/// Create the vault at `vault_address` exactly once.
///
/// A vault that already exists is returned untouched: the first creation
/// event is authoritative for every field.
///
/// With [`TemplatePolicy::Link`] the vault is linked to the most recent
/// release of `registry` at this point of the event stream. Creation events
/// carry no release reference, so the link is a best-effort heuristic: it is
/// wrong if a release for another template lands between the real
/// deployment and its indexed event.
#[allow(clippy::too_many_arguments)]
pub fn create<S: EntityStore>(
    store: &mut S,
    registry: &Registry,
    transaction: &Transaction,
    vault_address: Address,
    classification: Classification,
    api_version: &str,
    template_policy: TemplatePolicy,
    vault_type: VaultType,
) -> VaultOutcome {
    if let Some(existing) = store.vault(vault_address) {
        debug!(
            "Vault {} already exists (created in {}), ignoring {}",
            vault_address, existing.created_in, transaction.id
        );
        return VaultOutcome {
            vault: existing,
            created: false,
        };
    }

    let release = match template_policy {
        TemplatePolicy::Link => latest_release(store, registry.address).map(|r| r.link()),
        TemplatePolicy::Skip => None,
    };

    let vault = Vault {
        address: vault_address,
        classification,
        api_version: api_version.to_string(),
        vault_type,
        registry: registry.address,
        release,
        created_in: transaction.id,
        tag: None,
    };
    store.insert_vault(vault.clone());

    info!(
        "{} vault {} created on registry {} (api_version {}, type {}, release {:?})",
        classification,
        vault_address,
        registry.address,
        api_version,
        vault_type,
        release.map(|r| r.release_id)
    );

    VaultOutcome {
        vault,
        created: true,
    }
}

/// Overwrite the tag of the vault at `vault_address`.
///
/// A tag for an unknown vault means its creation event has not been
/// processed; this is logged and otherwise ignored.
pub fn tag<S: EntityStore>(store: &mut S, vault_address: Address, tag: &str) -> TagOutcome {
    if store.set_vault_tag(vault_address, tag) {
        info!("Vault {} tagged '{}'", vault_address, tag);
        TagOutcome::Applied
    } else {
        warn!(
            "Tag '{}' for unknown vault {}: creation event not processed yet",
            tag, vault_address
        );
        TagOutcome::UnknownVault
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::tests::context;
    use crate::reconcile::{registry, release, transaction};
    use crate::store::MemoryStore;
    use alloy::primitives::U256;
    use vaultreg_core::types::Purpose;

    const REGISTRY: Address = Address::repeat_byte(0x01);
    const VAULT: Address = Address::repeat_byte(0x0f);

    fn setup(store: &mut MemoryStore) -> (Registry, Transaction) {
        let ctx = context(0x50, 50, 0);
        let tx = transaction::get_or_create(store, &ctx, Purpose::NewVault);
        let registry = registry::get_or_create(store, REGISTRY, &tx);
        (registry, tx)
    }

    fn add_release(store: &mut MemoryStore, tx_byte: u8, template: Address, api_version: &str) {
        let ctx = context(tx_byte, 40, 0);
        let tx = transaction::get_or_create(store, &ctx, Purpose::FirstNewRelease);
        release::release(
            store,
            REGISTRY,
            template,
            api_version,
            U256::ZERO,
            &ctx,
            &tx,
        );
    }

    #[test]
    fn test_create_links_latest_release() {
        let mut store = MemoryStore::new();
        add_release(&mut store, 0x01, Address::repeat_byte(0xaa), "0.1.0");
        add_release(&mut store, 0x02, Address::repeat_byte(0xbb), "0.2.0");
        let (registry, tx) = setup(&mut store);

        let outcome = create(
            &mut store,
            &registry,
            &tx,
            VAULT,
            Classification::Endorsed,
            "0.2.0",
            TemplatePolicy::Link,
            VaultType::LEGACY,
        );

        assert!(outcome.created);
        let link = outcome.vault.release.unwrap();
        assert_eq!(link.release_id, 2);
        assert_eq!(link.template, Address::repeat_byte(0xbb));
    }

    #[test]
    fn test_create_without_release_or_with_skip_policy() {
        let mut store = MemoryStore::new();
        let (registry, tx) = setup(&mut store);

        let unlinked = create(
            &mut store,
            &registry,
            &tx,
            VAULT,
            Classification::Experimental,
            "0.4.0",
            TemplatePolicy::Link,
            VaultType::LEGACY,
        );
        assert!(unlinked.vault.release.is_none());

        add_release(&mut store, 0x01, Address::repeat_byte(0xaa), "0.1.0");
        let skipped = create(
            &mut store,
            &registry,
            &tx,
            Address::repeat_byte(0x77),
            Classification::Endorsed,
            "0.4.0",
            TemplatePolicy::Skip,
            VaultType::LEGACY,
        );
        assert!(skipped.vault.release.is_none());
    }

    #[test]
    fn test_duplicate_create_keeps_first_fields() {
        let mut store = MemoryStore::new();
        let (registry, tx) = setup(&mut store);

        create(
            &mut store,
            &registry,
            &tx,
            VAULT,
            Classification::Endorsed,
            "0.3.0",
            TemplatePolicy::Link,
            VaultType::LEGACY,
        );
        let again = create(
            &mut store,
            &registry,
            &tx,
            VAULT,
            Classification::Experimental,
            "0.9.9",
            TemplatePolicy::Link,
            VaultType::from(U256::from(2u64)),
        );

        assert!(!again.created);
        assert_eq!(again.vault.classification, Classification::Endorsed);
        assert_eq!(again.vault.api_version, "0.3.0");
        assert!(again.vault.vault_type.is_legacy());
        assert_eq!(store.graph().vaults().count(), 1);
    }

    #[test]
    fn test_tag_last_write_wins() {
        let mut store = MemoryStore::new();
        let (registry, tx) = setup(&mut store);
        create(
            &mut store,
            &registry,
            &tx,
            VAULT,
            Classification::Endorsed,
            "0.3.0",
            TemplatePolicy::Link,
            VaultType::LEGACY,
        );

        assert_eq!(tag(&mut store, VAULT, "first"), TagOutcome::Applied);
        assert_eq!(tag(&mut store, VAULT, "second"), TagOutcome::Applied);
        assert_eq!(store.vault(VAULT).unwrap().tag.as_deref(), Some("second"));
    }

    #[test]
    fn test_tag_unknown_vault_is_noop() {
        let mut store = MemoryStore::new();
        let before = store.graph().clone();

        assert_eq!(tag(&mut store, VAULT, "orphan"), TagOutcome::UnknownVault);
        assert_eq!(store.graph(), &before);
        assert_eq!(store.pending_changes(), 0);
    }
}
