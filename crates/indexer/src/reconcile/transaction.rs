//! Transaction resolver.

use vaultreg_core::types::{Purpose, Transaction, TransactionId};

use crate::mapping::EventContext;
use crate::store::EntityStore;

/// Get or create the transaction record for `(context.tx_hash, purpose)`.
///
/// An existing record is returned unchanged, even if `context` carries
/// different block data.
pub fn get_or_create<S: EntityStore>(
    store: &mut S,
    context: &EventContext,
    purpose: Purpose,
) -> Transaction {
    let id = TransactionId::new(context.tx_hash, purpose);
    if let Some(existing) = store.transaction(&id) {
        return existing;
    }

    let transaction = Transaction {
        id,
        sender: context.tx_from,
        block_number: context.block_number,
        block_timestamp: context.block_timestamp,
        gas_price: context.gas_price,
        gas_limit: context.gas_limit,
    };
    store.insert_transaction(transaction.clone());
    transaction
}
