//! Event mapping layer.
//!
//! Translates each registry event shape into calls on the reconciliation
//! core. The three historical `NewVault` shapes collapse into one
//! [`NewVaultInput`] before they reach the vault engine. Nothing here holds
//! state; the emitting registry address always comes from the event
//! context and is passed down explicitly.

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use tracing::info;
use vaultreg_core::types::{
    BlockCoordinates, Classification, EventKey, Purpose, TemplatePolicy, VaultType,
};

use crate::reconcile::{registry, release, transaction, vault};
use crate::store::EntityStore;

/// Chain context delivered with every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    /// Emitting contract (the registry).
    pub address: Address,
    /// Block number.
    pub block_number: u64,
    /// Block timestamp (unix seconds).
    pub block_timestamp: u64,
    /// Transaction hash.
    pub tx_hash: B256,
    /// Transaction index within the block.
    #[serde(default)]
    pub tx_index: u64,
    /// Log index within the block.
    pub log_index: u64,
    /// Transaction sender.
    pub tx_from: Address,
    /// Gas price in wei, if known.
    #[serde(default)]
    pub gas_price: Option<u128>,
    /// Gas limit, if known.
    #[serde(default)]
    pub gas_limit: Option<u128>,
}

impl EventContext {
    /// Unique key of the log.
    pub fn event_key(&self) -> EventKey {
        EventKey::new(self.tx_hash, self.log_index)
    }

    /// Position of the log on chain.
    pub fn coordinates(&self) -> BlockCoordinates {
        BlockCoordinates::new(self.block_number, self.tx_index, self.log_index)
    }
}

/// Decoded registry event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RegistryEvent {
    /// `NewRelease(uint256 indexed release_id, address template, string api_version)`
    NewRelease {
        /// Contract-internal release counter.
        release_id: U256,
        /// Template address.
        template: Address,
        /// api_version string.
        api_version: String,
    },
    /// Standard registry `NewVault(token, deployment_id, vault, api_version)`.
    NewVault {
        /// Underlying token.
        token: Address,
        /// Deployment id.
        deployment_id: U256,
        /// Vault address.
        vault: Address,
        /// api_version string.
        api_version: String,
    },
    /// Alternate registry `NewVault(token, vaultId, vault, apiVersion)`.
    ///
    /// The vault id is not part of the canonical input.
    NewVaultLegacy {
        /// Underlying token.
        token: Address,
        /// Vault address.
        vault: Address,
        /// api_version string.
        api_version: String,
    },
    /// Versioned registry `NewVault(token, vaultId, vaultType, vault, apiVersion)`.
    NewVaultV3 {
        /// Underlying token.
        token: Address,
        /// Registry-assigned vault id.
        vault_id: U256,
        /// Vault flavor.
        vault_type: U256,
        /// Vault address.
        vault: Address,
        /// api_version string.
        api_version: String,
    },
    /// `NewExperimentalVault(token, deployer, vault, api_version)`.
    NewExperimentalVault {
        /// Underlying token.
        token: Address,
        /// Deployer.
        deployer: Address,
        /// Vault address.
        vault: Address,
        /// api_version string.
        api_version: String,
    },
    /// `VaultTagged(address vault, string tag)`.
    VaultTagged {
        /// Vault address.
        vault: Address,
        /// Tag string.
        tag: String,
    },
}

impl RegistryEvent {
    /// Event name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            RegistryEvent::NewRelease { .. } => "NewRelease",
            RegistryEvent::NewVault { .. } => "NewVault",
            RegistryEvent::NewVaultLegacy { .. } => "NewVault1",
            RegistryEvent::NewVaultV3 { .. } => "NewVaultV3",
            RegistryEvent::NewExperimentalVault { .. } => "NewExperimentalVault",
            RegistryEvent::VaultTagged { .. } => "VaultTagged",
        }
    }
}

/// One event occurrence as handed over by the deliverer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredEvent {
    /// Chain context.
    pub context: EventContext,
    /// Decoded payload.
    pub event: RegistryEvent,
}

/// Canonical input of every endorsed vault-creation shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVaultInput {
    /// Emitting registry.
    pub registry: Address,
    /// api_version string.
    pub api_version: String,
    /// Deployment id, zero when the shape has none.
    pub deployment_id: U256,
    /// Underlying token (logged only).
    pub token: Address,
    /// Vault address.
    pub vault: Address,
    /// Vault flavor, legacy when the shape has none.
    pub vault_type: VaultType,
}

/// What applying an event did to the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// A new release was recorded.
    ReleaseCreated {
        /// Registry.
        registry: Address,
        /// Assigned release id.
        release_id: u64,
    },
    /// The release event had already been applied.
    DuplicateRelease {
        /// Registry.
        registry: Address,
        /// Previously assigned release id.
        release_id: u64,
    },
    /// A new vault was created.
    VaultCreated {
        /// Vault address.
        vault: Address,
    },
    /// A vault already existed at this address.
    DuplicateVault {
        /// Vault address.
        vault: Address,
    },
    /// A tag was written.
    Tagged {
        /// Vault address.
        vault: Address,
    },
    /// A tag arrived for a vault that does not exist yet.
    OrphanTag {
        /// Vault address.
        vault: Address,
    },
}

/// Route one delivered event to its handler.
pub fn handle_event<S: EntityStore>(store: &mut S, delivered: &DeliveredEvent) -> EventOutcome {
    let context = &delivered.context;
    let registry = context.address;

    match &delivered.event {
        RegistryEvent::NewRelease {
            release_id,
            template,
            api_version,
        } => handle_new_release(store, registry, context, *release_id, *template, api_version),
        RegistryEvent::NewVault {
            token,
            deployment_id,
            vault,
            api_version,
        } => handle_new_vault(
            store,
            registry,
            context,
            *token,
            *deployment_id,
            *vault,
            api_version,
        ),
        RegistryEvent::NewVaultLegacy {
            token,
            vault,
            api_version,
        } => handle_new_vault_in_vault_registry(
            store,
            registry,
            context,
            *token,
            *vault,
            api_version,
        ),
        RegistryEvent::NewVaultV3 {
            token,
            vault_id,
            vault_type,
            vault,
            api_version,
        } => handle_new_vault_in_registry_v3(
            store,
            registry,
            context,
            *token,
            *vault_id,
            *vault_type,
            *vault,
            api_version,
        ),
        RegistryEvent::NewExperimentalVault {
            token: _,
            deployer,
            vault,
            api_version,
        } => handle_new_experimental_vault(
            store,
            registry,
            context,
            *deployer,
            *vault,
            api_version,
        ),
        RegistryEvent::VaultTagged { vault, tag } => {
            handle_vault_tagged(store, registry, context, *vault, tag)
        }
    }
}

/// `NewRelease`: anchors the registry (first release may be its genesis)
/// and records the next release.
pub fn handle_new_release<S: EntityStore>(
    store: &mut S,
    registry: Address,
    context: &EventContext,
    release_id: U256,
    template: Address,
    api_version: &str,
) -> EventOutcome {
    info!(
        "[Registry] NewRelease: Registry {} - ApiVersion {} - ReleaseID {} - Template {} - Sender {} - TX {}",
        registry, api_version, release_id, template, context.tx_from, context.tx_hash
    );

    let tx = transaction::get_or_create(store, context, Purpose::FirstNewRelease);
    registry::get_or_create(store, registry, &tx);
    let outcome = release::release(
        store,
        registry,
        template,
        api_version,
        release_id,
        context,
        &tx,
    );

    if outcome.created {
        registry::record_release(store, &outcome.release);
        EventOutcome::ReleaseCreated {
            registry,
            release_id: outcome.release.release_id,
        }
    } else {
        EventOutcome::DuplicateRelease {
            registry,
            release_id: outcome.release.release_id,
        }
    }
}

/// Standard registry `NewVault`.
pub fn handle_new_vault<S: EntityStore>(
    store: &mut S,
    registry: Address,
    context: &EventContext,
    token: Address,
    deployment_id: U256,
    vault: Address,
    api_version: &str,
) -> EventOutcome {
    let input = NewVaultInput {
        registry,
        api_version: api_version.to_string(),
        deployment_id,
        token,
        vault,
        vault_type: VaultType::LEGACY,
    };
    handle_new_vault_inner(store, context, &input)
}

/// Alternate registry `NewVault`: no deployment id, no vault type.
pub fn handle_new_vault_in_vault_registry<S: EntityStore>(
    store: &mut S,
    registry: Address,
    context: &EventContext,
    token: Address,
    vault: Address,
    api_version: &str,
) -> EventOutcome {
    let input = NewVaultInput {
        registry,
        api_version: api_version.to_string(),
        deployment_id: U256::ZERO,
        token,
        vault,
        vault_type: VaultType::LEGACY,
    };
    handle_new_vault_inner(store, context, &input)
}

/// Versioned registry `NewVault` with an explicit vault type.
#[allow(clippy::too_many_arguments)]
pub fn handle_new_vault_in_registry_v3<S: EntityStore>(
    store: &mut S,
    registry: Address,
    context: &EventContext,
    token: Address,
    vault_id: U256,
    vault_type: U256,
    vault: Address,
    api_version: &str,
) -> EventOutcome {
    let input = NewVaultInput {
        registry,
        api_version: api_version.to_string(),
        deployment_id: vault_id,
        token,
        vault,
        vault_type: VaultType::from(vault_type),
    };
    handle_new_vault_inner(store, context, &input)
}

/// Shared path of every endorsed vault-creation shape.
pub fn handle_new_vault_inner<S: EntityStore>(
    store: &mut S,
    context: &EventContext,
    input: &NewVaultInput,
) -> EventOutcome {
    info!(
        "[Registry] NewVault: Registry {} - New vault {} - Token {} - Deployment {} - Sender {} - TX {}",
        input.registry, input.vault, input.token, input.deployment_id, context.tx_from, context.tx_hash
    );

    let tx = transaction::get_or_create(store, context, Purpose::NewVault);
    let registry = registry::get_or_create(store, input.registry, &tx);
    let outcome = vault::create(
        store,
        &registry,
        &tx,
        input.vault,
        Classification::Endorsed,
        &input.api_version,
        TemplatePolicy::Link,
        input.vault_type,
    );

    vault_outcome(input.vault, outcome.created)
}

/// `NewExperimentalVault`.
pub fn handle_new_experimental_vault<S: EntityStore>(
    store: &mut S,
    registry: Address,
    context: &EventContext,
    deployer: Address,
    vault: Address,
    api_version: &str,
) -> EventOutcome {
    info!(
        "[Registry] NewExperimentalVault: Registry {} - Experimental vault {} - Deployer {} - Sender {} - TX {}",
        registry, vault, deployer, context.tx_from, context.tx_hash
    );

    let tx = transaction::get_or_create(store, context, Purpose::NewExperimentalVault);
    let registry = registry::get_or_create(store, registry, &tx);
    let outcome = vault::create(
        store,
        &registry,
        &tx,
        vault,
        Classification::Experimental,
        api_version,
        TemplatePolicy::Link,
        VaultType::LEGACY,
    );

    vault_outcome(vault, outcome.created)
}

/// `VaultTagged`.
pub fn handle_vault_tagged<S: EntityStore>(
    store: &mut S,
    registry: Address,
    context: &EventContext,
    vault: Address,
    tag: &str,
) -> EventOutcome {
    info!(
        "[Registry] VaultTagged: Registry {} - Vault {} - Tag {} - Sender {} - TX {}",
        registry, vault, tag, context.tx_from, context.tx_hash
    );

    match vault::tag(store, vault, tag) {
        vault::TagOutcome::Applied => EventOutcome::Tagged { vault },
        vault::TagOutcome::UnknownVault => EventOutcome::OrphanTag { vault },
    }
}

fn vault_outcome(vault: Address, created: bool) -> EventOutcome {
    if created {
        EventOutcome::VaultCreated { vault }
    } else {
        EventOutcome::DuplicateVault { vault }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::MemoryStore;

    pub(crate) const REGISTRY: Address = Address::repeat_byte(0x01);

    /// Context of a log emitted by [`REGISTRY`] in transaction `0x{tx_byte}..`.
    pub(crate) fn context(tx_byte: u8, block_number: u64, log_index: u64) -> EventContext {
        EventContext {
            address: REGISTRY,
            block_number,
            block_timestamp: 1_600_000_000 + block_number * 12,
            tx_hash: B256::repeat_byte(tx_byte),
            tx_index: 0,
            log_index,
            tx_from: Address::repeat_byte(0xee),
            gas_price: None,
            gas_limit: None,
        }
    }

    fn delivered(context: EventContext, event: RegistryEvent) -> DeliveredEvent {
        DeliveredEvent { context, event }
    }

    #[test]
    fn test_vault_shapes_share_canonical_path() {
        let mut store = MemoryStore::new();
        let token = Address::repeat_byte(0x70);

        let standard = handle_event(
            &mut store,
            &delivered(
                context(0x01, 1, 0),
                RegistryEvent::NewVault {
                    token,
                    deployment_id: U256::from(3u64),
                    vault: Address::repeat_byte(0xa1),
                    api_version: "0.3.0".to_string(),
                },
            ),
        );
        let legacy = handle_event(
            &mut store,
            &delivered(
                context(0x02, 2, 0),
                RegistryEvent::NewVaultLegacy {
                    token,
                    vault: Address::repeat_byte(0xa2),
                    api_version: "0.4.2".to_string(),
                },
            ),
        );
        let v3 = handle_event(
            &mut store,
            &delivered(
                context(0x03, 3, 0),
                RegistryEvent::NewVaultV3 {
                    token,
                    vault_id: U256::from(9u64),
                    vault_type: U256::from(2u64),
                    vault: Address::repeat_byte(0xa3),
                    api_version: "0.4.6".to_string(),
                },
            ),
        );

        assert!(matches!(standard, EventOutcome::VaultCreated { .. }));
        assert!(matches!(legacy, EventOutcome::VaultCreated { .. }));
        assert!(matches!(v3, EventOutcome::VaultCreated { .. }));

        let a1 = store.vault(Address::repeat_byte(0xa1)).unwrap();
        let a2 = store.vault(Address::repeat_byte(0xa2)).unwrap();
        let a3 = store.vault(Address::repeat_byte(0xa3)).unwrap();
        assert!(a1.vault_type.is_legacy());
        assert!(a2.vault_type.is_legacy());
        assert_eq!(a3.vault_type, VaultType::from(U256::from(2u64)));
        for vault in [&a1, &a2, &a3] {
            assert_eq!(vault.classification, Classification::Endorsed);
            assert_eq!(vault.registry, REGISTRY);
            assert_eq!(vault.created_in.purpose, Purpose::NewVault);
        }
        assert_eq!(store.graph().registries().count(), 1);
    }

    #[test]
    fn test_experimental_vault_classification_and_purpose() {
        let mut store = MemoryStore::new();
        let vault = Address::repeat_byte(0xb1);

        handle_event(
            &mut store,
            &delivered(
                context(0x04, 4, 1),
                RegistryEvent::NewExperimentalVault {
                    token: Address::repeat_byte(0x70),
                    deployer: Address::repeat_byte(0x71),
                    vault,
                    api_version: "0.4.3".to_string(),
                },
            ),
        );

        let created = store.vault(vault).unwrap();
        assert_eq!(created.classification, Classification::Experimental);
        assert_eq!(created.created_in.purpose, Purpose::NewExperimentalVault);

        let registry = store.registry(REGISTRY).unwrap();
        assert_eq!(registry.created_in.purpose, Purpose::NewExperimentalVault);
    }

    #[test]
    fn test_first_release_anchors_registry() {
        let mut store = MemoryStore::new();

        let outcome = handle_event(
            &mut store,
            &delivered(
                context(0x05, 5, 0),
                RegistryEvent::NewRelease {
                    release_id: U256::ZERO,
                    template: Address::repeat_byte(0xaa),
                    api_version: "0.1.0".to_string(),
                },
            ),
        );

        assert_eq!(
            outcome,
            EventOutcome::ReleaseCreated {
                registry: REGISTRY,
                release_id: 1
            }
        );
        let registry = store.registry(REGISTRY).unwrap();
        assert_eq!(registry.created_in.purpose, Purpose::FirstNewRelease);
        assert_eq!(registry.latest_release_id, Some(1));
        assert_eq!(registry.latest_api_version.as_deref(), Some("0.1.0"));
    }

    #[test]
    fn test_orphan_tag_outcome() {
        let mut store = MemoryStore::new();

        let outcome = handle_event(
            &mut store,
            &delivered(
                context(0x06, 6, 0),
                RegistryEvent::VaultTagged {
                    vault: Address::repeat_byte(0xc1),
                    tag: "early".to_string(),
                },
            ),
        );

        assert_eq!(
            outcome,
            EventOutcome::OrphanTag {
                vault: Address::repeat_byte(0xc1)
            }
        );
        assert_eq!(store.graph().vaults().count(), 0);
        assert_eq!(store.graph().transactions().count(), 0);
    }

    #[test]
    fn test_delivered_event_json_shape() {
        let json = r#"{
            "context": {
                "address": "0x0101010101010101010101010101010101010101",
                "block_number": 12,
                "block_timestamp": 1600000144,
                "tx_hash": "0x0707070707070707070707070707070707070707070707070707070707070707",
                "log_index": 3,
                "tx_from": "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee"
            },
            "event": {
                "type": "VaultTagged",
                "vault": "0xc1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1",
                "tag": "core"
            }
        }"#;

        let parsed: DeliveredEvent = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.context.address, REGISTRY);
        assert_eq!(parsed.context.tx_index, 0);
        assert_eq!(parsed.context.gas_price, None);
        assert_eq!(parsed.event.name(), "VaultTagged");
    }
}
