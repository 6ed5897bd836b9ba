//! # Vault Registry Core
//!
//! Entity types, identity keys and constants shared by the vault registry
//! indexer.
//!
//! ## Entities
//!
//! - **Transaction**: keyed by `(hash, purpose)`, immutable
//! - **Registry**: keyed by contract address, tracks its latest release
//! - **Release**: keyed by `(registry, release_id)`, immutable
//! - **Vault**: keyed by contract address; only the tag is mutable

#![warn(missing_docs)]

pub mod constants;
pub mod error;
pub mod types;

// Re-export commonly used items
pub use constants::*;
pub use error::{CoreError, Result};
pub use types::*;

// Re-export Alloy primitives for convenience
pub use alloy_primitives::{Address, B256, U256};
