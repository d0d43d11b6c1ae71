//! Built-in handlers for the core transaction type group.
//!
//! Each handler checks everything against current wallet state first and
//! only then writes. Balance and nonce movements go through [`Changes`], which
//! computes every resulting balance before touching a wallet.

mod delegate;
mod htlc;
mod ipfs;
mod transfer;
mod vote;

pub use delegate::{DelegateRegistrationHandler, DelegateResignationHandler};
pub use htlc::{HtlcClaimHandler, HtlcLockHandler, HtlcRefundHandler};
pub use ipfs::IpfsHandler;
pub use transfer::TransferHandler;
pub use vote::VoteHandler;

use crate::{TransactionHandler, Wallet, WalletManager};
use forge_crypto::derive_address;
use forge_transactions::{Transaction, TransactionError};
use forge_types::{Address, Amount, PublicKey};
use std::collections::BTreeMap;
use std::sync::Arc;

pub(crate) fn core_handlers() -> Vec<Arc<dyn TransactionHandler>> {
    vec![
        Arc::new(TransferHandler),
        Arc::new(DelegateRegistrationHandler),
        Arc::new(DelegateResignationHandler),
        Arc::new(VoteHandler),
        Arc::new(IpfsHandler),
        Arc::new(HtlcLockHandler),
        Arc::new(HtlcClaimHandler),
        Arc::new(HtlcRefundHandler),
    ]
}

/// Address of the wallet owning `public_key`, whether or not it exists yet.
pub(crate) fn sender_address(wallets: &WalletManager, public_key: &PublicKey) -> Address {
    wallets
        .wallet_by_public_key(public_key)
        .map_or_else(|| derive_address(public_key), |w| w.address().clone())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NonceStep {
    Increase,
    Decrease,
}

#[derive(Debug)]
struct Move {
    address: Address,
    amount: Amount,
    credit: bool,
}

/// The balance and nonce effect of one handler call.
#[derive(Debug)]
pub(crate) struct Changes {
    sender: Address,
    sender_key: PublicKey,
    nonce: NonceStep,
    moves: Vec<Move>,
}

impl Changes {
    /// Start applying `tx`: its nonce must be the sender's nonce + 1.
    pub fn apply(wallets: &WalletManager, tx: &Transaction) -> Result<Self, TransactionError> {
        let sender = sender_address(wallets, &tx.sender_public_key);
        let nonce = wallets.wallet(&sender).map_or(0, Wallet::nonce);
        let expected = nonce.checked_add(1).ok_or(TransactionError::Overflow)?;
        if tx.nonce != expected {
            return Err(TransactionError::InvalidNonce {
                expected,
                got: tx.nonce,
            });
        }
        Ok(Self::new(sender, tx.sender_public_key, NonceStep::Increase))
    }

    /// Start reverting `tx`: it must be the sender's latest transaction.
    pub fn revert(wallets: &WalletManager, tx: &Transaction) -> Result<Self, TransactionError> {
        let sender = sender_address(wallets, &tx.sender_public_key);
        let nonce = wallets.wallet(&sender).map_or(0, Wallet::nonce);
        if tx.nonce != nonce || nonce == 0 {
            return Err(TransactionError::InvalidNonce {
                expected: nonce,
                got: tx.nonce,
            });
        }
        Ok(Self::new(sender, tx.sender_public_key, NonceStep::Decrease))
    }

    fn new(sender: Address, sender_key: PublicKey, nonce: NonceStep) -> Self {
        Self {
            sender,
            sender_key,
            nonce,
            moves: Vec::new(),
        }
    }

    pub fn sender(&self) -> &Address {
        &self.sender
    }

    pub fn credit(&mut self, address: &Address, amount: Amount) -> &mut Self {
        self.push(address.clone(), amount, true)
    }

    pub fn debit(&mut self, address: &Address, amount: Amount) -> &mut Self {
        self.push(address.clone(), amount, false)
    }

    pub fn credit_sender(&mut self, amount: Amount) -> &mut Self {
        self.push(self.sender.clone(), amount, true)
    }

    pub fn debit_sender(&mut self, amount: Amount) -> &mut Self {
        self.push(self.sender.clone(), amount, false)
    }

    fn push(&mut self, address: Address, amount: Amount, credit: bool) -> &mut Self {
        if !amount.is_zero() {
            self.moves.push(Move {
                address,
                amount,
                credit,
            });
        }
        self
    }

    /// Check every movement in order, then write them all. Nothing is
    /// written if any balance would underflow or overflow.
    pub fn commit(self, wallets: &mut WalletManager) -> Result<(), TransactionError> {
        let mut balances: BTreeMap<Address, Amount> = BTreeMap::new();
        for step in &self.moves {
            let current = match balances.get(&step.address) {
                Some(balance) => *balance,
                None => wallets.wallet(&step.address).map_or(Amount::ZERO, Wallet::balance),
            };
            let next = if step.credit {
                current
                    .checked_add(step.amount)
                    .ok_or(TransactionError::Overflow)?
            } else {
                current
                    .checked_sub(step.amount)
                    .ok_or(TransactionError::InsufficientFunds {
                        needed: step.amount,
                        available: current,
                    })?
            };
            balances.insert(step.address.clone(), next);
        }

        let nonce = wallets.wallet(&self.sender).map_or(0, Wallet::nonce);
        let nonce = match self.nonce {
            NonceStep::Increase => nonce.checked_add(1),
            NonceStep::Decrease => nonce.checked_sub(1),
        }
        .ok_or(TransactionError::Overflow)?;

        wallets.find_by_public_key(&self.sender_key).set_nonce(nonce);
        for (address, balance) in balances {
            wallets.find_by_address(&address).set_balance(balance);
        }
        Ok(())
    }
}
