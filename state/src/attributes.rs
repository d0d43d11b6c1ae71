//! Typed wallet attributes.
//!
//! Every piece of protocol state beyond balance and nonce lives in one of
//! these categories. Plugin handlers that need their own state use the
//! string-keyed `extensions` namespace.

use forge_transactions::HtlcExpiration;
use forge_types::{Address, Amount, PublicKey, TransactionId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Names a category of [`WalletAttributes`] for generic queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttributeKind {
    Delegate,
    Vote,
    Htlc,
    Ipfs,
    Extension,
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Delegate => "delegate",
            Self::Vote => "vote",
            Self::Htlc => "htlc",
            Self::Ipfs => "ipfs",
            Self::Extension => "extension",
        };
        f.write_str(name)
    }
}

/// Delegate registration data. `vote_balance` only ever exists here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateInfo {
    pub username: String,
    /// Sum of the voting weight of every wallet voting for this delegate.
    pub vote_balance: Amount,
    pub resigned: bool,
    pub produced_blocks: u64,
    pub forged_fees: Amount,
    pub forged_rewards: Amount,
}

impl DelegateInfo {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }
}

/// An open hashed-timelock lock held by the sending wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtlcLock {
    pub amount: Amount,
    pub recipient: Address,
    pub secret_hash: [u8; 32],
    pub expiration: HtlcExpiration,
}

/// A lock that was claimed or refunded, kept by the settling wallet so the
/// settlement can be reverted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledLock {
    /// Wallet the lock was taken from.
    pub owner: Address,
    pub lock: HtlcLock,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtlcState {
    /// Open locks keyed by the id of the lock transaction.
    pub locks: BTreeMap<TransactionId, HtlcLock>,
    /// Sum of every open lock amount.
    pub locked_balance: Amount,
    /// Locks this wallet claimed or refunded.
    pub settled: BTreeMap<TransactionId, SettledLock>,
}

impl HtlcState {
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty() && self.settled.is_empty() && self.locked_balance.is_zero()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAttributes {
    pub delegate: Option<DelegateInfo>,
    /// Public key of the delegate this wallet votes for.
    pub vote: Option<PublicKey>,
    pub htlc: HtlcState,
    /// Registered IPFS content hashes.
    pub ipfs: BTreeSet<String>,
    pub extensions: BTreeMap<String, String>,
}

impl WalletAttributes {
    pub fn has(&self, kind: AttributeKind) -> bool {
        match kind {
            AttributeKind::Delegate => self.delegate.is_some(),
            AttributeKind::Vote => self.vote.is_some(),
            AttributeKind::Htlc => !self.htlc.is_empty(),
            AttributeKind::Ipfs => !self.ipfs.is_empty(),
            AttributeKind::Extension => !self.extensions.is_empty(),
        }
    }

    /// Clear a whole category.
    pub fn forget(&mut self, kind: AttributeKind) {
        match kind {
            AttributeKind::Delegate => self.delegate = None,
            AttributeKind::Vote => self.vote = None,
            AttributeKind::Htlc => self.htlc = HtlcState::default(),
            AttributeKind::Ipfs => self.ipfs.clear(),
            AttributeKind::Extension => self.extensions.clear(),
        }
    }

    pub fn is_empty(&self) -> bool {
        [
            AttributeKind::Delegate,
            AttributeKind::Vote,
            AttributeKind::Htlc,
            AttributeKind::Ipfs,
            AttributeKind::Extension,
        ]
        .into_iter()
        .all(|kind| !self.has(kind))
    }
}
