//! Speculative transaction application for the transaction pool.
//!
//! A [`PoolView`] forks the canonical state and applies candidate
//! transactions to the fork in the context of the block being assembled.
//! The canonical state is untouched; a view can be merged back only while
//! the canonical state is unchanged since the fork.

use forge_state::{StateError, WalletManager};
use forge_transactions::{BlockHeader, Transaction};
use forge_types::{Amount, PublicKey, TransactionId};

pub struct PoolView {
    fork: WalletManager,
    header: BlockHeader,
    accepted: Vec<TransactionId>,
}

impl PoolView {
    /// Fork `wallets` for transactions that would go into `header`'s block.
    pub fn new(wallets: &WalletManager, header: BlockHeader) -> Self {
        Self {
            fork: wallets.fork(),
            header,
            accepted: Vec::new(),
        }
    }

    /// Apply `tx` to the view. A rejected transaction leaves the view as it was.
    pub fn try_add(&mut self, tx: &Transaction) -> Result<(), StateError> {
        let header = self.header.clone();
        self.fork
            .with_block_context(&header, |wallets| wallets.apply_transaction(tx))??;
        self.accepted.push(tx.id);
        tracing::trace!(transaction = %tx.id, pending = self.accepted.len(), "accepted into pool view");
        Ok(())
    }

    /// Apply every transaction that fits, returning the ids of those rejected.
    pub fn fill<'a>(&mut self, txs: impl IntoIterator<Item = &'a Transaction>) -> Vec<TransactionId> {
        let mut rejected = Vec::new();
        for tx in txs {
            if let Err(err) = self.try_add(tx) {
                tracing::debug!(transaction = %tx.id, error = %err, "pool view rejected transaction");
                rejected.push(tx.id);
            }
        }
        rejected
    }

    /// Nonce the next transaction from `sender` must exceed by one.
    pub fn nonce(&self, sender: &PublicKey) -> u64 {
        self.fork.get_nonce(sender)
    }

    pub fn balance(&self, public_key: &PublicKey) -> Amount {
        self.fork
            .wallet_by_public_key(public_key)
            .map_or(Amount::ZERO, |w| w.balance())
    }

    pub fn accepted(&self) -> &[TransactionId] {
        &self.accepted
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn wallets(&self) -> &WalletManager {
        &self.fork
    }

    /// Make the view's state canonical.
    pub fn merge_into(self, wallets: &mut WalletManager) -> Result<(), StateError> {
        wallets.merge(self.fork)
    }
}
