//! Transaction building helpers.
//!
//! Used by genesis tooling, the replay daemon's fixtures and tests. The
//! builder fills in the id from the other fields, so a built transaction is
//! always self-consistent.

use crate::asset::{HtlcClaimAsset, HtlcExpiration, HtlcLockAsset, VoteAction};
use crate::{Asset, Transaction, TransactionError, TransactionKind};
use forge_types::{Address, Amount, PublicKey, TransactionId};

/// Fluent builder for [`Transaction`]s. Nonce defaults to 1, fee to zero.
#[derive(Clone, Debug)]
pub struct TransactionBuilder {
    kind: TransactionKind,
    sender_public_key: PublicKey,
    nonce: u64,
    recipient: Option<Address>,
    amount: Amount,
    fee: Amount,
    asset: Asset,
}

impl TransactionBuilder {
    pub fn new(kind: TransactionKind, sender_public_key: PublicKey) -> Self {
        Self {
            kind,
            sender_public_key,
            nonce: 1,
            recipient: None,
            amount: Amount::ZERO,
            fee: Amount::ZERO,
            asset: Asset::None,
        }
    }

    pub fn transfer(sender: PublicKey, recipient: Address, amount: Amount) -> Self {
        Self::new(TransactionKind::TRANSFER, sender)
            .recipient(recipient)
            .amount(amount)
    }

    pub fn delegate_registration(sender: PublicKey, username: impl Into<String>) -> Self {
        Self::new(TransactionKind::DELEGATE_REGISTRATION, sender).asset(
            Asset::DelegateRegistration {
                username: username.into(),
            },
        )
    }

    pub fn delegate_resignation(sender: PublicKey) -> Self {
        Self::new(TransactionKind::DELEGATE_RESIGNATION, sender).asset(Asset::DelegateResignation)
    }

    pub fn vote(sender: PublicKey, delegate: PublicKey) -> Self {
        Self::new(TransactionKind::VOTE, sender).asset(Asset::Vote {
            votes: vec![VoteAction::Vote(delegate)],
        })
    }

    pub fn unvote(sender: PublicKey, delegate: PublicKey) -> Self {
        Self::new(TransactionKind::VOTE, sender).asset(Asset::Vote {
            votes: vec![VoteAction::Unvote(delegate)],
        })
    }

    pub fn ipfs(sender: PublicKey, hash: impl Into<String>) -> Self {
        Self::new(TransactionKind::IPFS, sender).asset(Asset::Ipfs { hash: hash.into() })
    }

    pub fn htlc_lock(
        sender: PublicKey,
        recipient: Address,
        amount: Amount,
        secret_hash: [u8; 32],
        expiration: HtlcExpiration,
    ) -> Self {
        Self::new(TransactionKind::HTLC_LOCK, sender)
            .recipient(recipient)
            .amount(amount)
            .asset(Asset::HtlcLock(HtlcLockAsset {
                secret_hash,
                expiration,
            }))
    }

    pub fn htlc_claim(
        sender: PublicKey,
        lock_transaction_id: TransactionId,
        unlock_secret: Vec<u8>,
    ) -> Self {
        Self::new(TransactionKind::HTLC_CLAIM, sender).asset(Asset::HtlcClaim(HtlcClaimAsset {
            lock_transaction_id,
            unlock_secret,
        }))
    }

    pub fn htlc_refund(sender: PublicKey, lock_transaction_id: TransactionId) -> Self {
        Self::new(TransactionKind::HTLC_REFUND, sender)
            .asset(Asset::HtlcRefund { lock_transaction_id })
    }

    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn fee(mut self, fee: Amount) -> Self {
        self.fee = fee;
        self
    }

    pub fn amount(mut self, amount: Amount) -> Self {
        self.amount = amount;
        self
    }

    pub fn recipient(mut self, recipient: Address) -> Self {
        self.recipient = Some(recipient);
        self
    }

    pub fn asset(mut self, asset: Asset) -> Self {
        self.asset = asset;
        self
    }

    /// Finish the transaction and compute its id.
    pub fn build(self) -> Result<Transaction, TransactionError> {
        let mut tx = Transaction {
            id: TransactionId::ZERO,
            type_group: self.kind.type_group,
            type_id: self.kind.type_id,
            nonce: self.nonce,
            sender_public_key: self.sender_public_key,
            recipient: self.recipient,
            amount: self.amount,
            fee: self.fee,
            asset: self.asset,
        };
        tx.id = tx.compute_id()?;
        Ok(tx)
    }
}
