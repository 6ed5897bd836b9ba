//! Chain listener for registry lifecycle events.
//!
//! This module provides:
//! - Event ABI definitions and decoding per registry flavor
//! - RPC provider wrapper for Ethereum communication
//! - Sync engine feeding the reconciler and checkpointing to storage

pub mod events;
pub mod provider;
pub mod sync;

pub use events::{RegistryKind, RegistryLog};
pub use provider::RpcProvider;
pub use sync::SyncEngine;
