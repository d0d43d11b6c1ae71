use super::Changes;
use crate::{TransactionHandler, WalletManager};
use forge_transactions::{validate_transaction, Transaction, TransactionError, TransactionKind};

/// Moves `amount` from the sender to the recipient; the sender also pays the fee.
pub struct TransferHandler;

impl TransactionHandler for TransferHandler {
    fn kind(&self) -> TransactionKind {
        TransactionKind::TRANSFER
    }

    fn apply(&self, tx: &Transaction, wallets: &mut WalletManager) -> Result<(), TransactionError> {
        validate_transaction(tx)?;
        let recipient = tx.recipient.as_ref().ok_or(TransactionError::MissingRecipient)?;
        let debit = tx.total_debit().ok_or(TransactionError::Overflow)?;

        let mut changes = Changes::apply(wallets, tx)?;
        changes.debit_sender(debit).credit(recipient, tx.amount);
        changes.commit(wallets)
    }

    fn revert(&self, tx: &Transaction, wallets: &mut WalletManager) -> Result<(), TransactionError> {
        let recipient = tx.recipient.as_ref().ok_or(TransactionError::MissingRecipient)?;
        let debit = tx.total_debit().ok_or(TransactionError::Overflow)?;

        let mut changes = Changes::revert(wallets, tx)?;
        changes.credit_sender(debit).debit(recipient, tx.amount);
        changes.commit(wallets)
    }
}
