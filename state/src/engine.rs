//! Block and transaction application.
//!
//! A block is applied all-or-nothing: if any transaction (or the generator
//! credit) fails, the transactions already applied are reverted in reverse
//! order before the failure is returned. `revert_block` is the exact inverse
//! of `apply_block`, generator credit and its vote-balance cascade included.
//!
//! There is no transaction log. Undo relies on every handler's `revert`
//! being the inverse of its `apply`. If an undo step itself fails, whatever
//! was already undone is redone and [`StateError::RollbackFailed`] is
//! returned.

use crate::index::IndexName;
use crate::notifier::TransactionEffect;
use crate::{HtlcLock, StateError, WalletManager};
use forge_transactions::{Block, BlockHeader, Transaction};
use forge_types::{Address, Amount, BlockId};
use std::sync::Arc;

impl WalletManager {
    /// Run `f` with `header` as the current-block context.
    ///
    /// The context is not reentrant: a second block cannot start while one
    /// is in progress.
    pub fn with_block_context<R>(
        &mut self,
        header: &BlockHeader,
        f: impl FnOnce(&mut Self) -> R,
    ) -> Result<R, StateError> {
        if let Some(current) = &self.current_block {
            return Err(StateError::BlockInProgress { current: current.id });
        }
        self.current_block = Some(header.clone());
        let result = f(self);
        self.current_block = None;
        Ok(result)
    }

    pub fn apply_block(&mut self, block: &Block) -> Result<(), StateError> {
        self.with_block_context(&block.header, |wallets| wallets.apply_block_inner(block))??;
        self.generation += 1;
        tracing::debug!(
            block = %block.header.id,
            height = block.header.height,
            transactions = block.transactions.len(),
            "applied block"
        );
        Ok(())
    }

    fn apply_block_inner(&mut self, block: &Block) -> Result<(), StateError> {
        let (generator, created) = self.resolve_generator(&block.header)?;
        let result = self.apply_block_body(block, &generator);
        if result.is_err() && created {
            self.purge(&generator);
        }
        result
    }

    fn apply_block_body(&mut self, block: &Block, generator: &Address) -> Result<(), StateError> {
        let header = &block.header;
        for (applied, tx) in block.transactions.iter().enumerate() {
            if let Err(err) = self.apply_transaction(tx) {
                return Err(self.unwind(header, &block.transactions[..applied], err));
            }
        }
        if let Err(err) = self.credit_generator(generator, header) {
            return Err(self.unwind(header, &block.transactions, err));
        }
        Ok(())
    }

    /// The generator's address, creating the wallet at genesis. The flag is
    /// `true` when the wallet was created here.
    fn resolve_generator(&mut self, header: &BlockHeader) -> Result<(Address, bool), StateError> {
        let public_key = &header.generator_public_key;
        if let Some(wallet) = self.wallet_by_public_key(public_key) {
            return Ok((wallet.address().clone(), false));
        }
        if header.height == self.genesis_height {
            let existed = self.has_by_address(&forge_crypto::derive_address(public_key));
            let address = self.find_by_public_key(public_key).address().clone();
            self.reindex(&address);
            tracing::debug!(generator = %public_key, address = %address, "created genesis generator wallet");
            return Ok((address, !existed));
        }
        tracing::error!(
            generator = %public_key,
            block = %header.id,
            height = header.height,
            "failed to lookup generator of block"
        );
        Err(StateError::ConsistencyViolation {
            generator: public_key.to_hex(),
            block: header.id,
            height: header.height,
        })
    }

    /// Revert `applied` in reverse order, returning `cause`.
    ///
    /// If an undo step fails, the transactions already reverted here are
    /// applied again so the block is left exactly as far as it got, and the
    /// fatal rollback error is returned.
    fn unwind(
        &mut self,
        header: &BlockHeader,
        applied: &[Transaction],
        cause: StateError,
    ) -> StateError {
        tracing::error!(
            block = %header.id,
            height = header.height,
            applied = applied.len(),
            error = %cause,
            "failed to apply all transactions in block, reverting previous transactions"
        );
        for (reverted, tx) in applied.iter().rev().enumerate() {
            if let Err(rollback) = self.revert_transaction(tx) {
                tracing::error!(
                    block = %header.id,
                    transaction = %tx.id,
                    error = %rollback,
                    "failed to revert transaction while unwinding block"
                );
                let restore = &applied[applied.len() - reverted..];
                if let Err(reapply) = restore.iter().try_for_each(|tx| self.apply_transaction(tx)) {
                    tracing::error!(
                        block = %header.id,
                        error = %reapply,
                        "failed to re-apply transactions after a failed unwind"
                    );
                }
                return StateError::RollbackFailed {
                    block: header.id,
                    cause: Box::new(cause),
                    rollback: Box::new(rollback),
                };
            }
        }
        cause
    }

    pub fn revert_block(&mut self, block: &Block) -> Result<(), StateError> {
        let header = &block.header;
        let Some(generator) = self
            .wallet_by_public_key(&header.generator_public_key)
            .map(|w| w.address().clone())
        else {
            tracing::error!(
                generator = %header.generator_public_key,
                block = %header.id,
                height = header.height,
                "failed to lookup generator of block"
            );
            return Err(StateError::ConsistencyViolation {
                generator: header.generator_public_key.to_hex(),
                block: header.id,
                height: header.height,
            });
        };

        self.with_block_context(header, |wallets| {
            wallets.revert_block_inner(block, &generator)
        })??;
        self.generation += 1;
        tracing::debug!(block = %header.id, height = header.height, "reverted block");
        Ok(())
    }

    fn revert_block_inner(&mut self, block: &Block, generator: &Address) -> Result<(), StateError> {
        let header = &block.header;
        self.debit_generator(generator, header)?;

        let total = block.transactions.len();
        for (reverted, tx) in block.transactions.iter().rev().enumerate() {
            if let Err(err) = self.revert_transaction(tx) {
                tracing::error!(
                    block = %header.id,
                    height = header.height,
                    transaction = %tx.id,
                    error = %err,
                    "failed to revert all transactions in block, applying previous transactions"
                );
                return Err(self.replay(
                    header,
                    generator,
                    &block.transactions[total - reverted..],
                    err,
                ));
            }
        }
        Ok(())
    }

    /// Re-apply `reverted` in original order and restore the generator
    /// credit after a failed block revert.
    fn replay(
        &mut self,
        header: &BlockHeader,
        generator: &Address,
        reverted: &[Transaction],
        cause: StateError,
    ) -> StateError {
        let restored = reverted
            .iter()
            .try_for_each(|tx| self.apply_transaction(tx))
            .and_then(|()| self.credit_generator(generator, header));
        match restored {
            Ok(()) => cause,
            Err(rollback) => {
                tracing::error!(
                    block = %header.id,
                    error = %rollback,
                    "failed to restore block after a failed revert"
                );
                StateError::RollbackFailed {
                    block: header.id,
                    cause: Box::new(cause),
                    rollback: Box::new(rollback),
                }
            }
        }
    }

    /// Credit reward and fees to the generator and raise the vote balance of
    /// the delegate it votes for by the same amount.
    fn credit_generator(&mut self, generator: &Address, header: &BlockHeader) -> Result<(), StateError> {
        let wallet = self
            .wallet_mut(generator)
            .ok_or_else(|| StateError::UnknownWallet(generator.to_string()))?;
        if !wallet.apply_block(header)? {
            return Ok(());
        }
        let Some(delegate) = wallet.vote().copied() else {
            return Ok(());
        };

        let credit = block_credit(header)?;
        if let Err(err) = self.adjust_vote_balance(&delegate, credit, Amount::ZERO) {
            if let Some(wallet) = self.wallet_mut(generator) {
                wallet.revert_block(header)?;
            }
            return Err(err);
        }
        Ok(())
    }

    /// Inverse of [`Self::credit_generator`].
    fn debit_generator(&mut self, generator: &Address, header: &BlockHeader) -> Result<(), StateError> {
        let wallet = self
            .wallet_mut(generator)
            .ok_or_else(|| StateError::UnknownWallet(generator.to_string()))?;
        if !wallet.revert_block(header)? {
            return Ok(());
        }
        let Some(delegate) = wallet.vote().copied() else {
            return Ok(());
        };

        let credit = block_credit(header)?;
        if let Err(err) = self.adjust_vote_balance(&delegate, Amount::ZERO, credit) {
            if let Some(wallet) = self.wallet_mut(generator) {
                wallet.apply_block(header)?;
            }
            return Err(err);
        }
        Ok(())
    }

    pub fn apply_transaction(&mut self, tx: &Transaction) -> Result<(), StateError> {
        let handler = self.handlers.get(tx.kind())?;
        let (lock_wallet, lock_transaction) = self.resolve_lock(tx);

        handler
            .apply(tx, self)
            .map_err(|source| StateError::TransactionApply { id: tx.id, source })?;

        let (sender, recipient) = self.parties(tx);
        let effect = TransactionEffect {
            sender,
            recipient,
            transaction: tx,
            lock_wallet,
            lock_transaction,
            revert: false,
        };
        let consensus = Arc::clone(&self.consensus);
        if let Err(err) = consensus.add_transaction(self, &effect) {
            tracing::warn!(transaction = %tx.id, error = %err, "consensus rejected applied transaction");
            if let Err(source) = handler.revert(tx, self) {
                return Err(self.rollback_failed(err, StateError::TransactionRevert { id: tx.id, source }));
            }
            return Err(err);
        }
        Ok(())
    }

    pub fn revert_transaction(&mut self, tx: &Transaction) -> Result<(), StateError> {
        let handler = self.handlers.get(tx.kind())?;
        let (sender, recipient) = self.parties(tx);

        handler
            .revert(tx, self)
            .map_err(|source| StateError::TransactionRevert { id: tx.id, source })?;

        let (lock_wallet, lock_transaction) = self.resolve_lock(tx);
        let effect = TransactionEffect {
            sender,
            recipient,
            transaction: tx,
            lock_wallet,
            lock_transaction,
            revert: true,
        };
        let consensus = Arc::clone(&self.consensus);
        if let Err(err) = consensus.add_transaction(self, &effect) {
            tracing::warn!(transaction = %tx.id, error = %err, "consensus rejected reverted transaction");
            if let Err(source) = handler.apply(tx, self) {
                return Err(self.rollback_failed(err, StateError::TransactionApply { id: tx.id, source }));
            }
            return Err(err);
        }
        Ok(())
    }

    /// Sender and recipient addresses, creating the wallets if needed.
    fn parties(&mut self, tx: &Transaction) -> (Address, Option<Address>) {
        let sender = self.find_by_public_key(&tx.sender_public_key).address().clone();
        let recipient = tx
            .recipient
            .as_ref()
            .map(|recipient| self.find_by_address(recipient).address().clone());
        (sender, recipient)
    }

    /// Owner and record of the lock an HTLC claim refers to.
    fn resolve_lock(&self, tx: &Transaction) -> (Option<Address>, Option<HtlcLock>) {
        let Some(lock_id) = tx.htlc_claim_lock_id() else {
            return (None, None);
        };
        let Some(owner) = self.index_of(IndexName::Locks).get(&lock_id.to_string()) else {
            return (None, None);
        };
        let lock = self
            .wallet(owner)
            .and_then(|wallet| wallet.attributes().htlc.locks.get(lock_id).cloned());
        (Some(owner.clone()), lock)
    }

    fn rollback_failed(&self, cause: StateError, rollback: StateError) -> StateError {
        let block = self
            .current_block
            .as_ref()
            .map_or(BlockId::ZERO, |header| header.id);
        tracing::error!(block = %block, error = %rollback, "failed to undo transaction after consensus rejection");
        StateError::RollbackFailed {
            block,
            cause: Box::new(cause),
            rollback: Box::new(rollback),
        }
    }
}

fn block_credit(header: &BlockHeader) -> Result<Amount, StateError> {
    header
        .generator_credit()
        .ok_or_else(|| StateError::Overflow(format!("credit of block {}", header.id)))
}
