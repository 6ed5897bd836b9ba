//! Registry event ABIs and log decoding.
//!
//! The standard and alternate registries emit `NewVault` events with the
//! same signature hash, so the decoder is chosen by the configured
//! [`RegistryKind`] of the emitting address, not by topic alone.

use alloy::primitives::{Address, B256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use vaultreg_core::types::BlockCoordinates;

use crate::mapping::{DeliveredEvent, EventContext, RegistryEvent};

/// Standard (endorsed) registry events.
pub mod registry_abi {
    alloy::sol! {
        /// A new vault template release.
        #[derive(Debug, PartialEq, Eq)]
        event NewRelease(uint256 indexed release_id, address template, string api_version);

        /// A new endorsed vault.
        #[derive(Debug, PartialEq, Eq)]
        event NewVault(
            address indexed token,
            uint256 indexed deployment_id,
            address vault,
            string api_version
        );

        /// A new experimental vault.
        #[derive(Debug, PartialEq, Eq)]
        event NewExperimentalVault(
            address indexed token,
            address indexed deployer,
            address vault,
            string api_version
        );

        /// A vault was tagged.
        #[derive(Debug, PartialEq, Eq)]
        event VaultTagged(address vault, string tag);
    }
}

/// Alternate vault registry events (camelCase, no vault type).
pub mod vault_registry_abi {
    alloy::sol! {
        /// A new vault.
        #[derive(Debug, PartialEq, Eq)]
        event NewVault(
            address indexed token,
            uint256 indexed vaultId,
            address vault,
            string apiVersion
        );
    }
}

/// Versioned vault registry events.
pub mod registry_v3_abi {
    alloy::sol! {
        /// A new vault of an explicit flavor.
        #[derive(Debug, PartialEq, Eq)]
        event NewVault(
            address indexed token,
            uint256 indexed vaultId,
            uint256 vaultType,
            address vault,
            string apiVersion
        );
    }
}

/// Event ABI flavor of a registry contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryKind {
    /// Standard registry: releases, endorsed/experimental vaults, tags.
    #[default]
    Registry,
    /// Alternate registry emitting the camelCase `NewVault`.
    VaultRegistry,
    /// Versioned registry emitting `NewVault` with a vault type.
    RegistryV3,
}

impl RegistryKind {
    /// Topic0 of every event this flavor emits.
    pub fn signatures(&self) -> Vec<B256> {
        match self {
            RegistryKind::Registry => vec![
                registry_abi::NewRelease::SIGNATURE_HASH,
                registry_abi::NewVault::SIGNATURE_HASH,
                registry_abi::NewExperimentalVault::SIGNATURE_HASH,
                registry_abi::VaultTagged::SIGNATURE_HASH,
            ],
            RegistryKind::VaultRegistry => vec![vault_registry_abi::NewVault::SIGNATURE_HASH],
            RegistryKind::RegistryV3 => vec![registry_v3_abi::NewVault::SIGNATURE_HASH],
        }
    }

    /// Decode a log emitted by a registry of this flavor.
    ///
    /// Returns `Ok(None)` for logs with an unknown topic. A log whose topic
    /// matches but whose payload does not decode is an error: the configured
    /// flavor does not match the contract.
    pub fn decode(&self, log: &Log) -> Result<Option<RegistryEvent>> {
        let Some(topic0) = log.topics().first().copied() else {
            return Ok(None);
        };
        let inner = &log.inner;

        let event = match self {
            RegistryKind::Registry => {
                if topic0 == registry_abi::NewRelease::SIGNATURE_HASH {
                    let ev = registry_abi::NewRelease::decode_log(inner, true)
                        .context("Failed to decode NewRelease event")?
                        .data;
                    RegistryEvent::NewRelease {
                        release_id: ev.release_id,
                        template: ev.template,
                        api_version: ev.api_version,
                    }
                } else if topic0 == registry_abi::NewVault::SIGNATURE_HASH {
                    let ev = registry_abi::NewVault::decode_log(inner, true)
                        .context("Failed to decode NewVault event")?
                        .data;
                    RegistryEvent::NewVault {
                        token: ev.token,
                        deployment_id: ev.deployment_id,
                        vault: ev.vault,
                        api_version: ev.api_version,
                    }
                } else if topic0 == registry_abi::NewExperimentalVault::SIGNATURE_HASH {
                    let ev = registry_abi::NewExperimentalVault::decode_log(inner, true)
                        .context("Failed to decode NewExperimentalVault event")?
                        .data;
                    RegistryEvent::NewExperimentalVault {
                        token: ev.token,
                        deployer: ev.deployer,
                        vault: ev.vault,
                        api_version: ev.api_version,
                    }
                } else if topic0 == registry_abi::VaultTagged::SIGNATURE_HASH {
                    let ev = registry_abi::VaultTagged::decode_log(inner, true)
                        .context("Failed to decode VaultTagged event")?
                        .data;
                    RegistryEvent::VaultTagged {
                        vault: ev.vault,
                        tag: ev.tag,
                    }
                } else {
                    return Ok(None);
                }
            }
            RegistryKind::VaultRegistry => {
                if topic0 != vault_registry_abi::NewVault::SIGNATURE_HASH {
                    return Ok(None);
                }
                let ev = vault_registry_abi::NewVault::decode_log(inner, true)
                    .context("Failed to decode vault registry NewVault event")?
                    .data;
                RegistryEvent::NewVaultLegacy {
                    token: ev.token,
                    vault: ev.vault,
                    api_version: ev.apiVersion,
                }
            }
            RegistryKind::RegistryV3 => {
                if topic0 != registry_v3_abi::NewVault::SIGNATURE_HASH {
                    return Ok(None);
                }
                let ev = registry_v3_abi::NewVault::decode_log(inner, true)
                    .context("Failed to decode registry v3 NewVault event")?
                    .data;
                RegistryEvent::NewVaultV3 {
                    token: ev.token,
                    vault_id: ev.vaultId,
                    vault_type: ev.vaultType,
                    vault: ev.vault,
                    api_version: ev.apiVersion,
                }
            }
        };

        Ok(Some(event))
    }
}

/// A decoded registry log that still lacks its transaction context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryLog {
    /// Emitting registry.
    pub address: Address,
    /// Decoded payload.
    pub event: RegistryEvent,
    /// Block number where the event occurred
    pub block_number: u64,
    /// Transaction index within the block
    pub tx_index: u64,
    /// Log index within the block
    pub log_index: u64,
    /// Transaction hash
    pub tx_hash: B256,
    /// Block timestamp, when the node includes it in the log
    pub block_timestamp: Option<u64>,
}

impl RegistryLog {
    /// Decode an Alloy log emitted by a registry of flavor `kind`.
    pub fn from_log(kind: RegistryKind, log: &Log) -> Result<Option<Self>> {
        let Some(event) = kind.decode(log)? else {
            return Ok(None);
        };

        let block_number = log.block_number.context("Log missing block_number")?;
        let tx_index = log
            .transaction_index
            .context("Log missing transaction_index")?;
        let log_index = log.log_index.context("Log missing log_index")?;
        let tx_hash = log
            .transaction_hash
            .context("Log missing transaction_hash")?;

        Ok(Some(Self {
            address: log.inner.address,
            event,
            block_number,
            tx_index,
            log_index,
            tx_hash,
            block_timestamp: log.block_timestamp,
        }))
    }

    /// Position of the log on chain.
    pub fn coordinates(&self) -> BlockCoordinates {
        BlockCoordinates::new(self.block_number, self.tx_index, self.log_index)
    }

    /// Attach the transaction context.
    pub fn into_delivered(
        self,
        block_timestamp: u64,
        tx_from: Address,
        gas_price: Option<u128>,
        gas_limit: Option<u128>,
    ) -> DeliveredEvent {
        DeliveredEvent {
            context: EventContext {
                address: self.address,
                block_number: self.block_number,
                block_timestamp,
                tx_hash: self.tx_hash,
                tx_index: self.tx_index,
                log_index: self.log_index,
                tx_from,
                gas_price,
                gas_limit,
            },
            event: self.event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;

    fn rpc_log<E: SolEvent>(address: Address, event: &E, log_index: u64) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address,
                data: event.encode_log_data(),
            },
            block_hash: Some(B256::repeat_byte(0xbb)),
            block_number: Some(100),
            block_timestamp: None,
            transaction_hash: Some(B256::repeat_byte(0xaa)),
            transaction_index: Some(2),
            log_index: Some(log_index),
            removed: false,
        }
    }

    #[test]
    fn test_decode_new_release() {
        let event = registry_abi::NewRelease {
            release_id: U256::from(4u64),
            template: Address::repeat_byte(0x0a),
            api_version: "0.4.3".to_string(),
        };
        let log = rpc_log(Address::repeat_byte(0x01), &event, 7);

        let decoded = RegistryLog::from_log(RegistryKind::Registry, &log)
            .unwrap()
            .unwrap();

        assert_eq!(decoded.address, Address::repeat_byte(0x01));
        assert_eq!(decoded.coordinates(), BlockCoordinates::new(100, 2, 7));
        assert_eq!(
            decoded.event,
            RegistryEvent::NewRelease {
                release_id: U256::from(4u64),
                template: Address::repeat_byte(0x0a),
                api_version: "0.4.3".to_string(),
            }
        );
    }

    #[test]
    fn test_same_signature_decoded_per_kind() {
        assert_eq!(
            registry_abi::NewVault::SIGNATURE_HASH,
            vault_registry_abi::NewVault::SIGNATURE_HASH
        );

        let event = registry_abi::NewVault {
            token: Address::repeat_byte(0x70),
            deployment_id: U256::from(5u64),
            vault: Address::repeat_byte(0xa1),
            api_version: "0.3.5".to_string(),
        };
        let log = rpc_log(Address::repeat_byte(0x01), &event, 0);

        let standard = RegistryKind::Registry.decode(&log).unwrap().unwrap();
        let alternate = RegistryKind::VaultRegistry.decode(&log).unwrap().unwrap();

        assert!(matches!(
            standard,
            RegistryEvent::NewVault { deployment_id, .. } if deployment_id == U256::from(5u64)
        ));
        assert_eq!(
            alternate,
            RegistryEvent::NewVaultLegacy {
                token: Address::repeat_byte(0x70),
                vault: Address::repeat_byte(0xa1),
                api_version: "0.3.5".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_v3_new_vault() {
        let event = registry_v3_abi::NewVault {
            token: Address::repeat_byte(0x70),
            vaultId: U256::from(11u64),
            vaultType: U256::from(2u64),
            vault: Address::repeat_byte(0xa3),
            apiVersion: "0.4.6".to_string(),
        };
        let log = rpc_log(Address::repeat_byte(0x03), &event, 1);

        let decoded = RegistryKind::RegistryV3.decode(&log).unwrap().unwrap();
        assert!(matches!(
            decoded,
            RegistryEvent::NewVaultV3 { vault_type, .. } if vault_type == U256::from(2u64)
        ));

        // The standard registry has no such event.
        assert!(RegistryKind::Registry.decode(&log).unwrap().is_none());
    }

    #[test]
    fn test_unknown_topic_is_skipped() {
        let event = registry_abi::VaultTagged {
            vault: Address::repeat_byte(0xa1),
            tag: "core".to_string(),
        };
        let log = rpc_log(Address::repeat_byte(0x02), &event, 0);

        assert!(RegistryLog::from_log(RegistryKind::RegistryV3, &log)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        let event = registry_abi::VaultTagged {
            vault: Address::repeat_byte(0xa1),
            tag: "core".to_string(),
        };
        let mut log = rpc_log(Address::repeat_byte(0x01), &event, 0);
        // Same topic, truncated data.
        log.inner.data = alloy::primitives::LogData::new_unchecked(
            log.inner.data.topics().to_vec(),
            alloy::primitives::Bytes::from(vec![0u8; 4]),
        );

        assert!(RegistryKind::Registry.decode(&log).is_err());
    }

    #[test]
    fn test_into_delivered() {
        let event = registry_abi::VaultTagged {
            vault: Address::repeat_byte(0xa1),
            tag: "core".to_string(),
        };
        let log = rpc_log(Address::repeat_byte(0x01), &event, 9);
        let decoded = RegistryLog::from_log(RegistryKind::Registry, &log)
            .unwrap()
            .unwrap();

        let delivered =
            decoded.into_delivered(1_700_000_000, Address::repeat_byte(0xee), Some(7), None);

        assert_eq!(delivered.context.block_timestamp, 1_700_000_000);
        assert_eq!(delivered.context.tx_from, Address::repeat_byte(0xee));
        assert_eq!(delivered.context.log_index, 9);
        assert_eq!(delivered.context.gas_price, Some(7));
        assert_eq!(delivered.event.name(), "VaultTagged");
    }
}
