use super::{sender_address, Changes};
use crate::{DelegateInfo, TransactionHandler, WalletManager};
use forge_transactions::{
    validate_transaction, Asset, Transaction, TransactionError, TransactionKind,
};
use forge_types::Address;

fn username(tx: &Transaction) -> Result<&str, TransactionError> {
    match &tx.asset {
        Asset::DelegateRegistration { username } => Ok(username),
        _ => Err(TransactionError::UnexpectedAsset {
            kind: tx.kind().to_string(),
        }),
    }
}

/// Registers the sender as a delegate under a unique username.
pub struct DelegateRegistrationHandler;

impl TransactionHandler for DelegateRegistrationHandler {
    fn kind(&self) -> TransactionKind {
        TransactionKind::DELEGATE_REGISTRATION
    }

    fn apply(&self, tx: &Transaction, wallets: &mut WalletManager) -> Result<(), TransactionError> {
        validate_transaction(tx)?;
        let username = username(tx)?;
        let sender = sender_address(wallets, &tx.sender_public_key);
        if wallets.wallet(&sender).is_some_and(|w| w.is_delegate()) {
            return Err(TransactionError::AlreadyDelegate);
        }
        if wallets.has_by_username(username) {
            return Err(TransactionError::UsernameTaken(username.to_string()));
        }

        let mut changes = Changes::apply(wallets, tx)?;
        changes.debit_sender(tx.fee);
        changes.commit(wallets)?;

        wallets.find_by_address(&sender).attributes_mut().delegate =
            Some(DelegateInfo::new(username));
        wallets.reindex(&sender);
        Ok(())
    }

    fn revert(&self, tx: &Transaction, wallets: &mut WalletManager) -> Result<(), TransactionError> {
        let username = username(tx)?;
        let sender = sender_address(wallets, &tx.sender_public_key);
        let registered = wallets
            .wallet(&sender)
            .and_then(|w| w.delegate())
            .is_some_and(|d| d.username == username);
        if !registered {
            return Err(TransactionError::NotDelegate);
        }

        let mut changes = Changes::revert(wallets, tx)?;
        changes.credit_sender(tx.fee);
        changes.commit(wallets)?;

        wallets.find_by_address(&sender).attributes_mut().delegate = None;
        wallets.reindex(&sender);
        Ok(())
    }
}

/// Permanently withdraws the sender from delegate eligibility.
pub struct DelegateResignationHandler;

impl TransactionHandler for DelegateResignationHandler {
    fn kind(&self) -> TransactionKind {
        TransactionKind::DELEGATE_RESIGNATION
    }

    fn apply(&self, tx: &Transaction, wallets: &mut WalletManager) -> Result<(), TransactionError> {
        validate_transaction(tx)?;
        let sender = sender_address(wallets, &tx.sender_public_key);
        match wallets.wallet(&sender).and_then(|w| w.delegate()) {
            None => return Err(TransactionError::NotDelegate),
            Some(delegate) if delegate.resigned => return Err(TransactionError::AlreadyResigned),
            Some(_) => {}
        }

        let mut changes = Changes::apply(wallets, tx)?;
        changes.debit_sender(tx.fee);
        changes.commit(wallets)?;

        set_resigned(wallets, &sender, true);
        Ok(())
    }

    fn revert(&self, tx: &Transaction, wallets: &mut WalletManager) -> Result<(), TransactionError> {
        let sender = sender_address(wallets, &tx.sender_public_key);
        match wallets.wallet(&sender).and_then(|w| w.delegate()) {
            None => return Err(TransactionError::NotDelegate),
            Some(delegate) if !delegate.resigned => return Err(TransactionError::NotResigned),
            Some(_) => {}
        }

        let mut changes = Changes::revert(wallets, tx)?;
        changes.credit_sender(tx.fee);
        changes.commit(wallets)?;

        set_resigned(wallets, &sender, false);
        Ok(())
    }
}

fn set_resigned(wallets: &mut WalletManager, sender: &Address, resigned: bool) {
    if let Some(delegate) = wallets.find_by_address(sender).delegate_mut() {
        delegate.resigned = resigned;
    }
    wallets.reindex(sender);
}
