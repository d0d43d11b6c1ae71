//! Block and transaction data model consumed by the wallet-state engine.
//!
//! Transactions are dispatched to handlers by their [`TransactionKind`], a
//! `(type_group, type_id)` pair. The core type group carries:
//! - **Transfer**: move balance to a recipient
//! - **DelegateRegistration**: register the sender as a delegate under a username
//! - **Vote**: vote for (`+pk`) or unvote (`-pk`) a delegate
//! - **Ipfs**: register a content hash on the sender
//! - **DelegateResignation**: permanently resign as a delegate
//! - **HtlcLock / HtlcClaim / HtlcRefund**: hashed-timelock contracts
//!
//! Other type groups are free for plugin handlers; their payload travels as
//! [`Asset::Extension`].

pub mod asset;
pub mod block;
pub mod builder;
pub mod error;
pub mod validation;

pub use asset::{Asset, HtlcClaimAsset, HtlcExpiration, HtlcLockAsset, VoteAction};
pub use block::{Block, BlockHeader};
pub use builder::TransactionBuilder;
pub use error::TransactionError;
pub use validation::{validate_transaction, validate_username};

use forge_types::{Address, Amount, PublicKey, TransactionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type group of the built-in transaction kinds.
pub const CORE_TYPE_GROUP: u32 = 1;

/// Handler dispatch key: `(type_group, type_id)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionKind {
    pub type_group: u32,
    pub type_id: u16,
}

impl TransactionKind {
    pub const TRANSFER: Self = Self::core(0);
    pub const DELEGATE_REGISTRATION: Self = Self::core(2);
    pub const VOTE: Self = Self::core(3);
    pub const IPFS: Self = Self::core(5);
    pub const DELEGATE_RESIGNATION: Self = Self::core(7);
    pub const HTLC_LOCK: Self = Self::core(8);
    pub const HTLC_CLAIM: Self = Self::core(9);
    pub const HTLC_REFUND: Self = Self::core(10);

    pub const fn new(type_group: u32, type_id: u16) -> Self {
        Self {
            type_group,
            type_id,
        }
    }

    const fn core(type_id: u16) -> Self {
        Self::new(CORE_TYPE_GROUP, type_id)
    }

    pub fn is_core(&self) -> bool {
        self.type_group == CORE_TYPE_GROUP
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_group, self.type_id)
    }
}

/// A transaction as delivered by block ingestion.
///
/// Signatures have already been checked upstream, so none is carried here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub type_group: u32,
    pub type_id: u16,
    /// Must equal the sender's wallet nonce + 1 when applied.
    pub nonce: u64,
    pub sender_public_key: PublicKey,
    #[serde(default)]
    pub recipient: Option<Address>,
    #[serde(default)]
    pub amount: Amount,
    pub fee: Amount,
    #[serde(default)]
    pub asset: Asset,
}

impl Transaction {
    pub fn kind(&self) -> TransactionKind {
        TransactionKind::new(self.type_group, self.type_id)
    }

    /// The lock id referenced by an HTLC claim, if this is one.
    pub fn htlc_claim_lock_id(&self) -> Option<&TransactionId> {
        if self.kind() != TransactionKind::HTLC_CLAIM {
            return None;
        }
        match &self.asset {
            Asset::HtlcClaim(claim) => Some(&claim.lock_transaction_id),
            _ => None,
        }
    }

    /// Amount plus fee, or `None` on overflow.
    pub fn total_debit(&self) -> Option<Amount> {
        self.amount.checked_add(self.fee)
    }

    /// Deterministic id over every field except the id itself.
    pub fn compute_id(&self) -> Result<TransactionId, TransactionError> {
        let body = (
            self.type_group,
            self.type_id,
            self.nonce,
            &self.sender_public_key,
            &self.recipient,
            self.amount,
            self.fee,
            &self.asset,
        );
        let bytes =
            bincode::serialize(&body).map_err(|e| TransactionError::Encoding(e.to_string()))?;
        Ok(forge_crypto::hash_transaction(&bytes))
    }
}
