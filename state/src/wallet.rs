//! The wallet entity: one account's balance, nonce and attributes.

use crate::attributes::{AttributeKind, DelegateInfo, WalletAttributes};
use crate::StateError;
use forge_transactions::{BlockHeader, TransactionError};
use forge_types::{Address, Amount, PublicKey};
use serde::{Deserialize, Serialize};

/// A single account.
///
/// Wallets live in the manager's arena keyed by address; indices refer to
/// them by that address. The address never changes after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    address: Address,
    public_key: Option<PublicKey>,
    nonce: u64,
    balance: Amount,
    attributes: WalletAttributes,
}

impl Wallet {
    /// A zero-state wallet.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            public_key: None,
            nonce: 0,
            balance: Amount::ZERO,
            attributes: WalletAttributes::default(),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn public_key(&self) -> Option<&PublicKey> {
        self.public_key.as_ref()
    }

    pub fn set_public_key(&mut self, public_key: PublicKey) {
        self.public_key = Some(public_key);
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn set_nonce(&mut self, nonce: u64) {
        self.nonce = nonce;
    }

    pub fn increase_nonce(&mut self) -> Result<(), TransactionError> {
        self.nonce = self.nonce.checked_add(1).ok_or(TransactionError::Overflow)?;
        Ok(())
    }

    pub fn decrease_nonce(&mut self) -> Result<(), TransactionError> {
        self.nonce = self.nonce.checked_sub(1).ok_or(TransactionError::Overflow)?;
        Ok(())
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }

    pub fn set_balance(&mut self, balance: Amount) {
        self.balance = balance;
    }

    pub fn credit(&mut self, amount: Amount) -> Result<(), TransactionError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(TransactionError::Overflow)?;
        Ok(())
    }

    pub fn debit(&mut self, amount: Amount) -> Result<(), TransactionError> {
        self.balance = self.balance.checked_sub(amount).ok_or(
            TransactionError::InsufficientFunds {
                needed: amount,
                available: self.balance,
            },
        )?;
        Ok(())
    }

    pub fn attributes(&self) -> &WalletAttributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut WalletAttributes {
        &mut self.attributes
    }

    pub fn has_attribute(&self, kind: AttributeKind) -> bool {
        self.attributes.has(kind)
    }

    pub fn forget_attribute(&mut self, kind: AttributeKind) {
        self.attributes.forget(kind);
    }

    pub fn delegate(&self) -> Option<&DelegateInfo> {
        self.attributes.delegate.as_ref()
    }

    pub fn delegate_mut(&mut self) -> Option<&mut DelegateInfo> {
        self.attributes.delegate.as_mut()
    }

    pub fn is_delegate(&self) -> bool {
        self.attributes.delegate.is_some()
    }

    pub fn is_resigned(&self) -> bool {
        self.delegate().is_some_and(|d| d.resigned)
    }

    pub fn vote(&self) -> Option<&PublicKey> {
        self.attributes.vote.as_ref()
    }

    pub fn has_voted(&self) -> bool {
        self.attributes.vote.is_some()
    }

    /// What this wallet contributes to the vote balance of the delegate it
    /// votes for: spendable balance plus funds held in open locks.
    pub fn voting_weight(&self) -> Option<Amount> {
        self.balance.checked_add(self.attributes.htlc.locked_balance)
    }

    /// Whether the wallet carries no state worth keeping.
    pub fn can_be_purged(&self) -> bool {
        self.balance.is_zero() && self.nonce == 0 && self.attributes.is_empty()
    }

    /// Credit the forging reward if this wallet generated `header`.
    ///
    /// Returns `false`, touching nothing, when the generator is someone else.
    pub fn apply_block(&mut self, header: &BlockHeader) -> Result<bool, StateError> {
        if self.public_key.as_ref() != Some(&header.generator_public_key) {
            return Ok(false);
        }
        let credit = header
            .generator_credit()
            .ok_or_else(|| StateError::Overflow(format!("credit of block {}", header.id)))?;
        let balance = self
            .balance
            .checked_add(credit)
            .ok_or_else(|| StateError::Overflow(format!("balance of {}", self.address)))?;

        let delegate = match &self.attributes.delegate {
            Some(current) => Some(forged(current, header, true).ok_or_else(|| {
                StateError::Overflow(format!("forging counters of {}", self.address))
            })?),
            None => None,
        };

        self.balance = balance;
        if delegate.is_some() {
            self.attributes.delegate = delegate;
        }
        Ok(true)
    }

    /// Exact inverse of [`Wallet::apply_block`].
    pub fn revert_block(&mut self, header: &BlockHeader) -> Result<bool, StateError> {
        if self.public_key.as_ref() != Some(&header.generator_public_key) {
            return Ok(false);
        }
        let credit = header
            .generator_credit()
            .ok_or_else(|| StateError::Overflow(format!("credit of block {}", header.id)))?;
        let balance = self.balance.checked_sub(credit).ok_or_else(|| {
            StateError::Overflow(format!("balance of {} below block credit", self.address))
        })?;

        let delegate = match &self.attributes.delegate {
            Some(current) => Some(forged(current, header, false).ok_or_else(|| {
                StateError::Overflow(format!("forging counters of {}", self.address))
            })?),
            None => None,
        };

        self.balance = balance;
        if delegate.is_some() {
            self.attributes.delegate = delegate;
        }
        Ok(true)
    }
}

fn forged(current: &DelegateInfo, header: &BlockHeader, apply: bool) -> Option<DelegateInfo> {
    let mut next = current.clone();
    if apply {
        next.produced_blocks = next.produced_blocks.checked_add(1)?;
        next.forged_fees = next.forged_fees.checked_add(header.total_fee)?;
        next.forged_rewards = next.forged_rewards.checked_add(header.reward)?;
    } else {
        next.produced_blocks = next.produced_blocks.checked_sub(1)?;
        next.forged_fees = next.forged_fees.checked_sub(header.total_fee)?;
        next.forged_rewards = next.forged_rewards.checked_sub(header.reward)?;
    }
    Some(next)
}
