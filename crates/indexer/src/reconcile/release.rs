//! Release versioning engine.
//!
//! Release ids are assigned per registry as `1, 2, 3, ...` in arrival order.
//! The `release_id` field carried by the contract event is stored as
//! `contract_release_id` but never used for numbering: its semantics differ
//! between registry versions.

use alloy::primitives::{Address, U256};
use tracing::{debug, info};
use vaultreg_core::constants::FIRST_RELEASE_ID;
use vaultreg_core::types::{Release, Transaction};

use crate::mapping::EventContext;
use crate::store::EntityStore;

/// Result of [`release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseOutcome {
    /// The new or previously recorded release.
    pub release: Release,
    /// `false` when the event had already been applied.
    pub created: bool,
}

/// Record a new release of `template` on `registry`.
///
/// The next release id is derived from the number of releases already
/// recorded for the registry. Redelivery of the same log returns the
/// release recorded the first time without consuming an id.
pub fn release<S: EntityStore>(
    store: &mut S,
    registry: Address,
    template: Address,
    api_version: &str,
    release_id_hint: U256,
    context: &EventContext,
    transaction: &Transaction,
) -> ReleaseOutcome {
    let source = context.event_key();
    if let Some(existing) = store.release_by_source(&source) {
        debug!(
            "Release from {} already recorded as {}#{}",
            source, existing.registry, existing.release_id
        );
        return ReleaseOutcome {
            release: existing,
            created: false,
        };
    }

    let release_id = store.release_count(registry) + FIRST_RELEASE_ID;
    let release = Release {
        registry,
        release_id,
        template,
        api_version: api_version.to_string(),
        contract_release_id: release_id_hint,
        created_in: transaction.id,
        source,
    };
    store.insert_release(release.clone());

    info!(
        "Release {} on registry {}: template {} api_version {} (contract release_id {})",
        release_id, registry, template, api_version, release_id_hint
    );

    ReleaseOutcome {
        release,
        created: true,
    }
}

/// Most recent release recorded for `registry`, if any.
pub fn latest_release<S: EntityStore>(store: &S, registry: Address) -> Option<Release> {
    match store.release_count(registry) {
        0 => None,
        count => store.release(registry, count),
    }
}
