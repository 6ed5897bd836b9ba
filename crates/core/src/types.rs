//! Core entity and identity types for the vault registry.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{
    CLASSIFICATION_ENDORSED, CLASSIFICATION_EXPERIMENTAL, PURPOSE_FIRST_NEW_RELEASE,
    PURPOSE_NEW_EXPERIMENTAL_VAULT, PURPOSE_NEW_VAULT, REGISTRY_V3_VAULT_TYPE_LEGACY,
};
use crate::error::CoreError;

/// Deployment path a vault was created through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    /// Standard registry deployment path (and legacy single-registry vaults).
    Endorsed,
    /// Experimental deployment path.
    Experimental,
}

impl Classification {
    /// Stable string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Endorsed => CLASSIFICATION_ENDORSED,
            Classification::Experimental => CLASSIFICATION_EXPERIMENTAL,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            CLASSIFICATION_ENDORSED => Ok(Classification::Endorsed),
            CLASSIFICATION_EXPERIMENTAL => Ok(Classification::Experimental),
            _ => Err(CoreError::UnknownClassification(s.to_string())),
        }
    }
}

/// Logical purpose a transaction record was resolved for.
///
/// One on-chain transaction may carry several purposes, and each purpose
/// owns a separate [`Transaction`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Purpose {
    /// A `NewRelease` event (possibly the registry's genesis).
    #[serde(rename = "Registry-FirstNewReleaseEvent")]
    FirstNewRelease,
    /// Any of the `NewVault` event shapes.
    #[serde(rename = "NewVaultEvent")]
    NewVault,
    /// A `NewExperimentalVault` event.
    #[serde(rename = "NewExperimentalVault")]
    NewExperimentalVault,
}

impl Purpose {
    /// Persisted label of this purpose.
    pub fn label(&self) -> &'static str {
        match self {
            Purpose::FirstNewRelease => PURPOSE_FIRST_NEW_RELEASE,
            Purpose::NewVault => PURPOSE_NEW_VAULT,
            Purpose::NewExperimentalVault => PURPOSE_NEW_EXPERIMENTAL_VAULT,
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Purpose {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            PURPOSE_FIRST_NEW_RELEASE => Ok(Purpose::FirstNewRelease),
            PURPOSE_NEW_VAULT => Ok(Purpose::NewVault),
            PURPOSE_NEW_EXPERIMENTAL_VAULT => Ok(Purpose::NewExperimentalVault),
            _ => Err(CoreError::UnknownPurpose(s.to_string())),
        }
    }
}

/// Identity of a [`Transaction`] record: `(hash, purpose)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId {
    /// Transaction hash.
    pub hash: B256,
    /// Purpose label.
    pub purpose: Purpose,
}

impl TransactionId {
    /// Create a new transaction id.
    pub const fn new(hash: B256, purpose: Purpose) -> Self {
        Self { hash, purpose }
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.hash, self.purpose)
    }
}

/// Unique position of a log on chain: transaction hash plus log index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventKey {
    /// Transaction hash.
    pub tx_hash: B256,
    /// Log index within the block.
    pub log_index: u64,
}

impl EventKey {
    /// Create a new event key.
    pub const fn new(tx_hash: B256, log_index: u64) -> Self {
        Self { tx_hash, log_index }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_hash, self.log_index)
    }
}

/// Block coordinates for ordering events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockCoordinates {
    /// Block number
    pub block_number: u64,

    /// Transaction index within block
    pub tx_index: u64,

    /// Log index within the block
    pub log_index: u64,
}

impl BlockCoordinates {
    /// Create new block coordinates.
    pub fn new(block_number: u64, tx_index: u64, log_index: u64) -> Self {
        Self {
            block_number,
            tx_index,
            log_index,
        }
    }
}

/// Vault flavor discriminator.
///
/// Older registries carry no type field and report [`VaultType::LEGACY`];
/// the versioned registry reports the value explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultType(pub U256);

impl VaultType {
    /// Sentinel for vaults created without an explicit type.
    pub const LEGACY: VaultType = VaultType(REGISTRY_V3_VAULT_TYPE_LEGACY);

    /// Get the raw value.
    pub const fn value(&self) -> U256 {
        self.0
    }

    /// Whether this is the legacy sentinel.
    pub fn is_legacy(&self) -> bool {
        *self == Self::LEGACY
    }
}

impl Default for VaultType {
    fn default() -> Self {
        Self::LEGACY
    }
}

impl From<U256> for VaultType {
    fn from(value: U256) -> Self {
        VaultType(value)
    }
}

impl fmt::Display for VaultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether vault creation should attempt to link the vault to a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplatePolicy {
    /// Link to the registry's most recent release, if any.
    Link,
    /// Leave the release reference empty.
    Skip,
}

/// Canonical record of the transaction that produced an event.
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Identity `(hash, purpose)`.
    pub id: TransactionId,
    /// Sender (`tx.from`).
    pub sender: Address,
    /// Block number.
    pub block_number: u64,
    /// Block timestamp (unix seconds).
    pub block_timestamp: u64,
    /// Gas price in wei, when the deliverer knows it.
    pub gas_price: Option<u128>,
    /// Gas limit, when the deliverer knows it.
    pub gas_limit: Option<u128>,
}

/// A vault registry contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    /// Contract address.
    pub address: Address,
    /// Transaction that first brought the registry into view.
    pub created_in: TransactionId,
    /// Release id of the most recent release.
    pub latest_release_id: Option<u64>,
    /// api_version of the most recent release.
    pub latest_api_version: Option<String>,
}

/// Reference from a vault to the release it was linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseLink {
    /// Per-registry release id.
    pub release_id: u64,
    /// Template address of that release.
    pub template: Address,
}

/// A vault implementation template released on a registry.
///
/// Identity is `(registry, release_id)`. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Owning registry.
    pub registry: Address,
    /// Per-registry sequence number starting at 1.
    pub release_id: u64,
    /// Template (implementation) address.
    pub template: Address,
    /// api_version as reported.
    pub api_version: String,
    /// Raw `release_id` field of the contract event.
    pub contract_release_id: U256,
    /// Transaction record of the release.
    pub created_in: TransactionId,
    /// Log that produced this release.
    pub source: EventKey,
}

impl Release {
    /// Reference to this release for vault linkage.
    pub fn link(&self) -> ReleaseLink {
        ReleaseLink {
            release_id: self.release_id,
            template: self.template,
        }
    }
}

/// A deployed vault instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    /// Vault contract address.
    pub address: Address,
    /// Endorsed or Experimental.
    pub classification: Classification,
    /// api_version as reported by the creation event.
    pub api_version: String,
    /// Vault flavor.
    pub vault_type: VaultType,
    /// Owning registry.
    pub registry: Address,
    /// Best-effort release linkage (most recent release at creation time).
    pub release: Option<ReleaseLink>,
    /// Creation transaction.
    pub created_in: TransactionId,
    /// Free-form tag; last applied tag wins.
    pub tag: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_str_conversion() {
        assert_eq!(Classification::Endorsed.as_str(), "Endorsed");
        assert_eq!(Classification::Experimental.as_str(), "Experimental");

        assert_eq!(
            "Endorsed".parse::<Classification>().unwrap(),
            Classification::Endorsed
        );
        assert_eq!(
            "Experimental".parse::<Classification>().unwrap(),
            Classification::Experimental
        );
        assert!("endorsed".parse::<Classification>().is_err());
    }

    #[test]
    fn test_purpose_labels_round_trip() {
        for purpose in [
            Purpose::FirstNewRelease,
            Purpose::NewVault,
            Purpose::NewExperimentalVault,
        ] {
            assert_eq!(purpose.label().parse::<Purpose>().unwrap(), purpose);
        }
        assert_eq!(
            "Bogus".parse::<Purpose>(),
            Err(CoreError::UnknownPurpose("Bogus".to_string()))
        );
    }

    #[test]
    fn test_purpose_serializes_as_label() {
        let json = serde_json::to_string(&Purpose::FirstNewRelease).unwrap();
        assert_eq!(json, "\"Registry-FirstNewReleaseEvent\"");
    }

    #[test]
    fn test_transaction_id_display() {
        let id = TransactionId::new(B256::repeat_byte(0xab), Purpose::NewVault);
        let shown = id.to_string();
        assert!(shown.starts_with("0xabab"));
        assert!(shown.ends_with("-NewVaultEvent"));
    }

    #[test]
    fn test_vault_type_default_is_legacy() {
        assert!(VaultType::default().is_legacy());
        assert!(!VaultType::from(U256::from(2u64)).is_legacy());
    }

    #[test]
    fn test_block_coordinates_ordering() {
        let coord1 = BlockCoordinates::new(100, 5, 2);
        let coord2 = BlockCoordinates::new(100, 5, 3);
        let coord3 = BlockCoordinates::new(100, 6, 4);
        let coord4 = BlockCoordinates::new(101, 0, 0);

        assert!(coord1 < coord2);
        assert!(coord2 < coord3);
        assert!(coord3 < coord4);
    }
}
