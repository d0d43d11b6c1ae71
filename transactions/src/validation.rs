//! Stateless transaction validation.

use crate::error::TransactionError;
use crate::{Asset, Transaction, TransactionKind};

/// Maximum delegate username length.
pub const MAX_USERNAME_LEN: usize = 20;

/// Maximum length of a registered content hash.
pub const MAX_IPFS_HASH_LEN: usize = 90;

/// Validate a transaction's structure: the asset matches the kind and the
/// kind's basic amount/recipient rules hold.
///
/// This performs stateless validation only. Stateful checks (balance
/// sufficiency, nonces, delegate status, lock existence) are done by the
/// handlers against wallet state. Plugin type groups are not inspected.
pub fn validate_transaction(tx: &Transaction) -> Result<(), TransactionError> {
    let kind = tx.kind();
    if !kind.is_core() {
        return Ok(());
    }

    let moves_value = matches!(kind, TransactionKind::TRANSFER | TransactionKind::HTLC_LOCK);
    if !moves_value && !tx.amount.is_zero() {
        return Err(TransactionError::UnexpectedAmount {
            kind: kind.to_string(),
        });
    }

    match (kind, &tx.asset) {
        (TransactionKind::TRANSFER, Asset::None) => {
            if tx.amount.is_zero() {
                return Err(TransactionError::ZeroAmount);
            }
            if tx.recipient.is_none() {
                return Err(TransactionError::MissingRecipient);
            }
            Ok(())
        }
        (TransactionKind::DELEGATE_REGISTRATION, Asset::DelegateRegistration { username }) => {
            validate_username(username)
        }
        (TransactionKind::DELEGATE_RESIGNATION, Asset::DelegateResignation) => Ok(()),
        (TransactionKind::VOTE, Asset::Vote { votes }) => {
            if votes.len() != 1 {
                return Err(TransactionError::InvalidVoteCount(votes.len()));
            }
            Ok(())
        }
        (TransactionKind::IPFS, Asset::Ipfs { hash }) => validate_ipfs_hash(hash),
        (TransactionKind::HTLC_LOCK, Asset::HtlcLock(_)) => {
            if tx.amount.is_zero() {
                return Err(TransactionError::ZeroAmount);
            }
            if tx.recipient.is_none() {
                return Err(TransactionError::MissingRecipient);
            }
            Ok(())
        }
        (TransactionKind::HTLC_CLAIM, Asset::HtlcClaim(_)) => Ok(()),
        (TransactionKind::HTLC_REFUND, Asset::HtlcRefund { .. }) => Ok(()),
        _ => Err(TransactionError::UnexpectedAsset {
            kind: kind.to_string(),
        }),
    }
}

/// Delegate usernames are 1-20 characters of `a-z`, `0-9` and `!@$&_.`.
pub fn validate_username(username: &str) -> Result<(), TransactionError> {
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(TransactionError::InvalidUsername(username.to_string()));
    }
    let allowed = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || "!@$&_.".contains(c);
    if !username.chars().all(allowed) {
        return Err(TransactionError::InvalidUsername(username.to_string()));
    }
    Ok(())
}

fn validate_ipfs_hash(hash: &str) -> Result<(), TransactionError> {
    if hash.is_empty()
        || hash.len() > MAX_IPFS_HASH_LEN
        || !hash.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(TransactionError::InvalidIpfsHash(hash.to_string()));
    }
    Ok(())
}
