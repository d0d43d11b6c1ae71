//! Type-specific transaction payloads.

use forge_types::{PublicKey, Timestamp, TransactionId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The payload of a transaction. Which variant is valid depends on the
/// transaction kind; see [`crate::validate_transaction`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    #[default]
    None,
    DelegateRegistration {
        username: String,
    },
    DelegateResignation,
    Vote {
        votes: Vec<VoteAction>,
    },
    Ipfs {
        hash: String,
    },
    HtlcLock(HtlcLockAsset),
    HtlcClaim(HtlcClaimAsset),
    HtlcRefund {
        lock_transaction_id: TransactionId,
    },
    /// Opaque payload for plugin type groups.
    Extension(serde_json::Value),
}

/// A single vote operation, written `+<public key hex>` or `-<public key hex>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VoteAction {
    Vote(PublicKey),
    Unvote(PublicKey),
}

impl VoteAction {
    pub fn delegate(&self) -> &PublicKey {
        match self {
            Self::Vote(pk) | Self::Unvote(pk) => pk,
        }
    }
}

impl fmt::Display for VoteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vote(pk) => write!(f, "+{pk}"),
            Self::Unvote(pk) => write!(f, "-{pk}"),
        }
    }
}

impl FromStr for VoteAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let sign = chars.next();
        let parse_key = |key: &str| -> Result<PublicKey, String> {
            key.parse().map_err(|e| format!("invalid vote {s}: {e}"))
        };
        match sign {
            Some('+') => Ok(Self::Vote(parse_key(chars.as_str())?)),
            Some('-') => Ok(Self::Unvote(parse_key(chars.as_str())?)),
            _ => Err(format!("invalid vote {s}: must start with + or -")),
        }
    }
}

impl TryFrom<String> for VoteAction {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<VoteAction> for String {
    fn from(action: VoteAction) -> Self {
        action.to_string()
    }
}

/// When an HTLC lock stops being claimable and becomes refundable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HtlcExpiration {
    BlockHeight(u64),
    EpochTimestamp(Timestamp),
}

impl HtlcExpiration {
    /// Whether the lock has expired as of a block at `height` / `timestamp`.
    pub fn is_expired(&self, height: u64, timestamp: Timestamp) -> bool {
        match self {
            Self::BlockHeight(h) => height >= *h,
            Self::EpochTimestamp(t) => timestamp >= *t,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtlcLockAsset {
    /// SHA-256 of the unlock secret.
    #[serde(with = "hex::serde")]
    pub secret_hash: [u8; 32],
    pub expiration: HtlcExpiration,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtlcClaimAsset {
    pub lock_transaction_id: TransactionId,
    #[serde(with = "hex::serde")]
    pub unlock_secret: Vec<u8>,
}
