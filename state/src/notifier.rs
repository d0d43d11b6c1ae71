//! The seam through which consensus learns about applied transactions.

use crate::{HtlcLock, StateError, WalletManager};
use forge_transactions::Transaction;
use forge_types::Address;

/// The wallets a transaction touched, resolved by the manager.
#[derive(Clone, Debug)]
pub struct TransactionEffect<'a> {
    pub sender: Address,
    pub recipient: Option<Address>,
    pub transaction: &'a Transaction,
    /// Owner of the lock an HTLC claim settles.
    pub lock_wallet: Option<Address>,
    pub lock_transaction: Option<HtlcLock>,
    /// `true` when the transaction was just reverted.
    pub revert: bool,
}

/// Receives every applied and reverted transaction.
///
/// Implementations either make all of their changes or none; the manager
/// undoes the handler's effect when this returns an error.
pub trait ConsensusNotifier: Send + Sync {
    fn add_transaction(
        &self,
        wallets: &mut WalletManager,
        effect: &TransactionEffect<'_>,
    ) -> Result<(), StateError>;
}
