//! Vault registry event ingestion.
//!
//! This crate reconciles registry contract events into an entity graph of
//! registries, releases, vaults and the transactions that created them.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────┐
//! │  vaultreg-indexer            │
//! │                               │
//! │  ┌─────────────────┐          │
//! │  │  Event Listener │ ← Ethereum RPC
//! │  │  decode + enrich│   NewRelease, NewVault,
//! │  └────────┬────────┘   NewExperimentalVault, VaultTagged
//! │           │ DeliveredEvent    │
//! │      ┌────▼───────┐           │
//! │      │ Reconciler │           │
//! │      │ (mapping)  │           │
//! │      └────┬───────┘           │
//! │           │ MemoryStore       │
//! │      ┌────▼──────┐            │
//! │      │  Storage  │ ← SQLite   │
//! │      │ checkpoint│   entities + cursor
//! │      └───────────┘            │
//! └───────────────────────────────┘
//! ```
//!
//! Reconciliation itself never suspends: each event is applied to the
//! in-memory store in full before the next one is looked at. Persistence
//! happens between batches.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod listener;
pub mod mapping;
pub mod reconcile;
pub mod storage;
pub mod store;

pub use mapping::{DeliveredEvent, EventContext, EventOutcome, RegistryEvent};
pub use reconcile::{ReconcileStats, Reconciler};
pub use store::{EntityChange, EntityGraph, EntityStore, MemoryStore};
pub use vaultreg_core::types::*;
