//! Reconciliation core.
//!
//! - [`transaction`]: get-or-create transaction records per purpose
//! - [`registry`]: singleton registry per address
//! - [`release`]: per-registry release numbering
//! - [`vault`]: exactly-once vault creation and tagging
//!
//! Every operation is synchronous and idempotent: applying the same event
//! twice leaves the graph as after the first application. Idempotence is
//! the retry strategy; redelivery is the upstream deliverer's business.

pub mod registry;
pub mod release;
pub mod transaction;
pub mod vault;

use serde::Serialize;

use crate::mapping::{self, DeliveredEvent, EventOutcome};
use crate::store::{EntityStore, MemoryStore};

/// Counters over applied events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    /// Events applied.
    pub events: u64,
    /// Releases created.
    pub releases_created: u64,
    /// Vaults created.
    pub vaults_created: u64,
    /// Tags written.
    pub tags_applied: u64,
    /// Redelivered creation/release events absorbed.
    pub duplicates: u64,
    /// Tags for vaults that did not exist yet.
    pub orphan_tags: u64,
}

impl ReconcileStats {
    fn record(&mut self, outcome: &EventOutcome) {
        self.events += 1;
        match outcome {
            EventOutcome::ReleaseCreated { .. } => self.releases_created += 1,
            EventOutcome::VaultCreated { .. } => self.vaults_created += 1,
            EventOutcome::Tagged { .. } => self.tags_applied += 1,
            EventOutcome::DuplicateRelease { .. } | EventOutcome::DuplicateVault { .. } => {
                self.duplicates += 1
            }
            EventOutcome::OrphanTag { .. } => self.orphan_tags += 1,
        }
    }
}

/// Applies delivered events, one at a time, to an entity store.
#[derive(Debug)]
pub struct Reconciler<S = MemoryStore> {
    store: S,
    stats: ReconcileStats,
}

impl<S: EntityStore> Reconciler<S> {
    /// Create a reconciler over `store`.
    pub fn new(store: S) -> Self {
        Self {
            store,
            stats: ReconcileStats::default(),
        }
    }

    /// Apply one event and run it to completion.
    pub fn apply(&mut self, delivered: &DeliveredEvent) -> EventOutcome {
        let outcome = mapping::handle_event(&mut self.store, delivered);
        self.stats.record(&outcome);
        outcome
    }

    /// Apply events in the given order.
    pub fn apply_all<'a, I>(&mut self, events: I)
    where
        I: IntoIterator<Item = &'a DeliveredEvent>,
    {
        for delivered in events {
            self.apply(delivered);
        }
    }

    /// Counters since creation or the last [`Reconciler::take_stats`].
    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    /// Return and reset the counters.
    pub fn take_stats(&mut self) -> ReconcileStats {
        std::mem::take(&mut self.stats)
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutable access to the underlying store.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Consume the reconciler, returning the store.
    pub fn into_store(self) -> S {
        self.store
    }
}
