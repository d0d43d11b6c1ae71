use super::{sender_address, Changes};
use crate::index::IndexName;
use crate::{TransactionHandler, WalletManager};
use forge_transactions::{
    validate_transaction, Asset, Transaction, TransactionError, TransactionKind,
};

fn ipfs_hash(tx: &Transaction) -> Result<&str, TransactionError> {
    match &tx.asset {
        Asset::Ipfs { hash } => Ok(hash),
        _ => Err(TransactionError::UnexpectedAsset {
            kind: tx.kind().to_string(),
        }),
    }
}

/// Registers a content hash on the sender. A hash can be registered once.
pub struct IpfsHandler;

impl TransactionHandler for IpfsHandler {
    fn kind(&self) -> TransactionKind {
        TransactionKind::IPFS
    }

    fn apply(&self, tx: &Transaction, wallets: &mut WalletManager) -> Result<(), TransactionError> {
        validate_transaction(tx)?;
        let hash = ipfs_hash(tx)?;
        if wallets.index_of(IndexName::Ipfs).has(hash) {
            return Err(TransactionError::IpfsHashExists(hash.to_string()));
        }
        let sender = sender_address(wallets, &tx.sender_public_key);

        let mut changes = Changes::apply(wallets, tx)?;
        changes.debit_sender(tx.fee);
        changes.commit(wallets)?;

        wallets
            .find_by_address(&sender)
            .attributes_mut()
            .ipfs
            .insert(hash.to_string());
        wallets.reindex(&sender);
        Ok(())
    }

    fn revert(&self, tx: &Transaction, wallets: &mut WalletManager) -> Result<(), TransactionError> {
        let hash = ipfs_hash(tx)?;
        let sender = sender_address(wallets, &tx.sender_public_key);
        let registered = wallets
            .wallet(&sender)
            .is_some_and(|w| w.attributes().ipfs.contains(hash));
        if !registered {
            return Err(TransactionError::IpfsHashMissing(hash.to_string()));
        }

        let mut changes = Changes::revert(wallets, tx)?;
        changes.credit_sender(tx.fee);
        changes.commit(wallets)?;

        wallets
            .find_by_address(&sender)
            .attributes_mut()
            .ipfs
            .remove(hash);
        wallets.reindex(&sender);
        Ok(())
    }
}
