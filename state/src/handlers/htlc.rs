//! Hashed-timelock contracts: lock, claim with the secret, refund after expiry.
//!
//! A lock moves its amount from the sender's balance into a lock record and
//! `locked_balance`. Claims and refunds pay the lock amount minus the fee to
//! the settling wallet, which keeps the settled record so the settlement can
//! be reverted.

use super::{sender_address, Changes};
use crate::index::IndexName;
use crate::{HtlcLock, SettledLock, TransactionHandler, WalletManager};
use forge_crypto::sha256;
use forge_transactions::{
    validate_transaction, Asset, HtlcClaimAsset, HtlcLockAsset, Transaction, TransactionError,
    TransactionKind,
};
use forge_types::{Address, Amount, TransactionId};

fn lock_asset(tx: &Transaction) -> Result<&HtlcLockAsset, TransactionError> {
    match &tx.asset {
        Asset::HtlcLock(asset) => Ok(asset),
        _ => Err(unexpected(tx)),
    }
}

fn claim_asset(tx: &Transaction) -> Result<&HtlcClaimAsset, TransactionError> {
    match &tx.asset {
        Asset::HtlcClaim(asset) => Ok(asset),
        _ => Err(unexpected(tx)),
    }
}

fn refund_lock_id(tx: &Transaction) -> Result<TransactionId, TransactionError> {
    match &tx.asset {
        Asset::HtlcRefund {
            lock_transaction_id,
        } => Ok(*lock_transaction_id),
        _ => Err(unexpected(tx)),
    }
}

fn unexpected(tx: &Transaction) -> TransactionError {
    TransactionError::UnexpectedAsset {
        kind: tx.kind().to_string(),
    }
}

fn locked_balance(wallets: &WalletManager, address: &Address) -> Amount {
    wallets
        .wallet(address)
        .map_or(Amount::ZERO, |w| w.attributes().htlc.locked_balance)
}

/// What the settling wallet receives: the lock amount minus the fee.
fn payout(lock: &HtlcLock, fee: Amount) -> Result<Amount, TransactionError> {
    lock.amount
        .checked_sub(fee)
        .ok_or(TransactionError::InsufficientFunds {
            needed: fee,
            available: lock.amount,
        })
}

/// Remove an open lock from `owner`, updating its locked balance.
fn close_lock(wallets: &mut WalletManager, owner: &Address, lock_id: &TransactionId, locked: Amount) {
    let htlc = &mut wallets.find_by_address(owner).attributes_mut().htlc;
    htlc.locks.remove(lock_id);
    htlc.locked_balance = locked;
    wallets.reindex(owner);
}

/// Put a lock back on `owner`, updating its locked balance.
fn reopen_lock(
    wallets: &mut WalletManager,
    owner: &Address,
    lock_id: TransactionId,
    lock: HtlcLock,
    locked: Amount,
) {
    let htlc = &mut wallets.find_by_address(owner).attributes_mut().htlc;
    htlc.locks.insert(lock_id, lock);
    htlc.locked_balance = locked;
    wallets.reindex(owner);
}

pub struct HtlcLockHandler;

impl TransactionHandler for HtlcLockHandler {
    fn kind(&self) -> TransactionKind {
        TransactionKind::HTLC_LOCK
    }

    fn apply(&self, tx: &Transaction, wallets: &mut WalletManager) -> Result<(), TransactionError> {
        validate_transaction(tx)?;
        let asset = lock_asset(tx)?;
        let recipient = tx
            .recipient
            .clone()
            .ok_or(TransactionError::MissingRecipient)?;
        let block = wallets
            .current_block()
            .ok_or(TransactionError::NoCurrentBlock)?;
        if asset.expiration.is_expired(block.height, block.timestamp) {
            return Err(TransactionError::InvalidExpiration);
        }
        if wallets.index_of(IndexName::Locks).has(&tx.id.to_string()) {
            return Err(TransactionError::LockExists(tx.id.to_string()));
        }

        let sender = sender_address(wallets, &tx.sender_public_key);
        let locked = locked_balance(wallets, &sender)
            .checked_add(tx.amount)
            .ok_or(TransactionError::Overflow)?;
        let debit = tx.total_debit().ok_or(TransactionError::Overflow)?;

        let mut changes = Changes::apply(wallets, tx)?;
        changes.debit_sender(debit);
        changes.commit(wallets)?;

        let lock = HtlcLock {
            amount: tx.amount,
            recipient,
            secret_hash: asset.secret_hash,
            expiration: asset.expiration,
        };
        reopen_lock(wallets, &sender, tx.id, lock, locked);
        Ok(())
    }

    fn revert(&self, tx: &Transaction, wallets: &mut WalletManager) -> Result<(), TransactionError> {
        let sender = sender_address(wallets, &tx.sender_public_key);
        let amount = wallets
            .wallet(&sender)
            .and_then(|w| w.attributes().htlc.locks.get(&tx.id))
            .map(|lock| lock.amount)
            .ok_or_else(|| TransactionError::LockNotFound(tx.id.to_string()))?;
        let locked = locked_balance(wallets, &sender)
            .checked_sub(amount)
            .ok_or(TransactionError::Overflow)?;
        let debit = tx.total_debit().ok_or(TransactionError::Overflow)?;

        let mut changes = Changes::revert(wallets, tx)?;
        changes.credit_sender(debit);
        changes.commit(wallets)?;

        close_lock(wallets, &sender, &tx.id, locked);
        Ok(())
    }
}

/// Pays an open lock to its recipient when they present the secret in time.
pub struct HtlcClaimHandler;

impl TransactionHandler for HtlcClaimHandler {
    fn kind(&self) -> TransactionKind {
        TransactionKind::HTLC_CLAIM
    }

    fn apply(&self, tx: &Transaction, wallets: &mut WalletManager) -> Result<(), TransactionError> {
        validate_transaction(tx)?;
        let asset = claim_asset(tx)?;
        let lock_id = asset.lock_transaction_id;
        let not_found = || TransactionError::LockNotFound(lock_id.to_string());

        let owner = wallets
            .index_of(IndexName::Locks)
            .get(&lock_id.to_string())
            .cloned()
            .ok_or_else(not_found)?;
        let lock = wallets
            .wallet(&owner)
            .and_then(|w| w.attributes().htlc.locks.get(&lock_id))
            .cloned()
            .ok_or_else(not_found)?;

        let block = wallets
            .current_block()
            .ok_or(TransactionError::NoCurrentBlock)?;
        if lock.expiration.is_expired(block.height, block.timestamp) {
            return Err(TransactionError::LockExpired);
        }
        if sha256(&asset.unlock_secret) != lock.secret_hash {
            return Err(TransactionError::InvalidUnlockSecret);
        }
        let claimer = sender_address(wallets, &tx.sender_public_key);
        if claimer != lock.recipient {
            return Err(TransactionError::NotLockRecipient);
        }

        let payout = payout(&lock, tx.fee)?;
        let owner_locked = locked_balance(wallets, &owner)
            .checked_sub(lock.amount)
            .ok_or(TransactionError::Overflow)?;

        let mut changes = Changes::apply(wallets, tx)?;
        changes.credit_sender(payout);
        changes.commit(wallets)?;

        close_lock(wallets, &owner, &lock_id, owner_locked);
        wallets
            .find_by_address(&claimer)
            .attributes_mut()
            .htlc
            .settled
            .insert(lock_id, SettledLock { owner, lock });
        wallets.reindex(&claimer);
        Ok(())
    }

    fn revert(&self, tx: &Transaction, wallets: &mut WalletManager) -> Result<(), TransactionError> {
        let lock_id = claim_asset(tx)?.lock_transaction_id;
        let claimer = sender_address(wallets, &tx.sender_public_key);
        let settled = wallets
            .wallet(&claimer)
            .and_then(|w| w.attributes().htlc.settled.get(&lock_id))
            .cloned()
            .ok_or_else(|| TransactionError::LockNotFound(lock_id.to_string()))?;
        if wallets.index_of(IndexName::Locks).has(&lock_id.to_string()) {
            return Err(TransactionError::LockExists(lock_id.to_string()));
        }

        let payout = payout(&settled.lock, tx.fee)?;
        let owner_locked = locked_balance(wallets, &settled.owner)
            .checked_add(settled.lock.amount)
            .ok_or(TransactionError::Overflow)?;

        let mut changes = Changes::revert(wallets, tx)?;
        changes.debit_sender(payout);
        changes.commit(wallets)?;

        wallets
            .find_by_address(&claimer)
            .attributes_mut()
            .htlc
            .settled
            .remove(&lock_id);
        wallets.reindex(&claimer);
        reopen_lock(wallets, &settled.owner, lock_id, settled.lock, owner_locked);
        Ok(())
    }
}

/// Returns an expired lock to the wallet that opened it.
pub struct HtlcRefundHandler;

impl TransactionHandler for HtlcRefundHandler {
    fn kind(&self) -> TransactionKind {
        TransactionKind::HTLC_REFUND
    }

    fn apply(&self, tx: &Transaction, wallets: &mut WalletManager) -> Result<(), TransactionError> {
        validate_transaction(tx)?;
        let lock_id = refund_lock_id(tx)?;
        let sender = sender_address(wallets, &tx.sender_public_key);

        let lock = wallets
            .wallet(&sender)
            .and_then(|w| w.attributes().htlc.locks.get(&lock_id))
            .cloned();
        let Some(lock) = lock else {
            if wallets.index_of(IndexName::Locks).has(&lock_id.to_string()) {
                return Err(TransactionError::NotLockOwner);
            }
            return Err(TransactionError::LockNotFound(lock_id.to_string()));
        };

        let block = wallets
            .current_block()
            .ok_or(TransactionError::NoCurrentBlock)?;
        if !lock.expiration.is_expired(block.height, block.timestamp) {
            return Err(TransactionError::LockNotExpired);
        }

        let payout = payout(&lock, tx.fee)?;
        let locked = locked_balance(wallets, &sender)
            .checked_sub(lock.amount)
            .ok_or(TransactionError::Overflow)?;

        let mut changes = Changes::apply(wallets, tx)?;
        changes.credit_sender(payout);
        changes.commit(wallets)?;

        close_lock(wallets, &sender, &lock_id, locked);
        wallets
            .find_by_address(&sender)
            .attributes_mut()
            .htlc
            .settled
            .insert(
                lock_id,
                SettledLock {
                    owner: sender.clone(),
                    lock,
                },
            );
        wallets.reindex(&sender);
        Ok(())
    }

    fn revert(&self, tx: &Transaction, wallets: &mut WalletManager) -> Result<(), TransactionError> {
        let lock_id = refund_lock_id(tx)?;
        let sender = sender_address(wallets, &tx.sender_public_key);
        let settled = wallets
            .wallet(&sender)
            .and_then(|w| w.attributes().htlc.settled.get(&lock_id))
            .filter(|settled| settled.owner == sender)
            .cloned()
            .ok_or_else(|| TransactionError::LockNotFound(lock_id.to_string()))?;

        let payout = payout(&settled.lock, tx.fee)?;
        let locked = locked_balance(wallets, &sender)
            .checked_add(settled.lock.amount)
            .ok_or(TransactionError::Overflow)?;

        let mut changes = Changes::revert(wallets, tx)?;
        changes.debit_sender(payout);
        changes.commit(wallets)?;

        wallets
            .find_by_address(&sender)
            .attributes_mut()
            .htlc
            .settled
            .remove(&lock_id);
        reopen_lock(wallets, &sender, lock_id, settled.lock, locked);
        Ok(())
    }
}
