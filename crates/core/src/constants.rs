//! Canonical constants for the vault registry indexer.
//!
//! Label strings are part of persisted entity identity and must never change.

use alloy_primitives::U256;

/// Transaction purpose label for `NewRelease` events.
///
/// A fresh registry's genesis is either its first release or its first vault;
/// the release path anchors under this label.
pub const PURPOSE_FIRST_NEW_RELEASE: &str = "Registry-FirstNewReleaseEvent";

/// Transaction purpose label for every `NewVault` event shape.
pub const PURPOSE_NEW_VAULT: &str = "NewVaultEvent";

/// Transaction purpose label for `NewExperimentalVault` events.
pub const PURPOSE_NEW_EXPERIMENTAL_VAULT: &str = "NewExperimentalVault";

/// Classification label for vaults from the standard deployment path.
pub const CLASSIFICATION_ENDORSED: &str = "Endorsed";

/// Classification label for vaults from the experimental deployment path.
pub const CLASSIFICATION_EXPERIMENTAL: &str = "Experimental";

/// Vault type reported for every vault whose creation event has no
/// explicit `vaultType` field.
pub const REGISTRY_V3_VAULT_TYPE_LEGACY: U256 = U256::from_limbs([1, 0, 0, 0]);

/// First release id assigned to a registry.
pub const FIRST_RELEASE_ID: u64 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_vault_type_is_one() {
        assert_eq!(REGISTRY_V3_VAULT_TYPE_LEGACY, U256::from(1u64));
    }
}
