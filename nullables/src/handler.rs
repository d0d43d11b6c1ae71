//! Scripted transaction handler.

use forge_state::{TransactionHandler, WalletManager};
use forge_transactions::{Transaction, TransactionError, TransactionKind};
use forge_types::TransactionId;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// Wraps a real handler and fails chosen transactions on apply or revert.
///
/// Scripted failures happen before the inner handler runs, so they never
/// leave partial state behind.
pub struct ScriptedHandler {
    inner: Arc<dyn TransactionHandler>,
    fail_apply: BTreeSet<TransactionId>,
    fail_revert: BTreeSet<TransactionId>,
    applied: Mutex<Vec<TransactionId>>,
    reverted: Mutex<Vec<TransactionId>>,
}

impl ScriptedHandler {
    pub fn wrap(inner: Arc<dyn TransactionHandler>) -> Self {
        Self {
            inner,
            fail_apply: BTreeSet::new(),
            fail_revert: BTreeSet::new(),
            applied: Mutex::new(Vec::new()),
            reverted: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_apply_of(mut self, id: TransactionId) -> Self {
        self.fail_apply.insert(id);
        self
    }

    pub fn fail_revert_of(mut self, id: TransactionId) -> Self {
        self.fail_revert.insert(id);
        self
    }

    /// Ids successfully applied, in call order.
    pub fn applied(&self) -> Vec<TransactionId> {
        self.applied.lock().unwrap().clone()
    }

    /// Ids successfully reverted, in call order.
    pub fn reverted(&self) -> Vec<TransactionId> {
        self.reverted.lock().unwrap().clone()
    }
}

impl TransactionHandler for ScriptedHandler {
    fn kind(&self) -> TransactionKind {
        self.inner.kind()
    }

    fn apply(&self, tx: &Transaction, wallets: &mut WalletManager) -> Result<(), TransactionError> {
        if self.fail_apply.contains(&tx.id) {
            return Err(TransactionError::Other(format!("scripted apply failure of {}", tx.id)));
        }
        self.inner.apply(tx, wallets)?;
        self.applied.lock().unwrap().push(tx.id);
        Ok(())
    }

    fn revert(&self, tx: &Transaction, wallets: &mut WalletManager) -> Result<(), TransactionError> {
        if self.fail_revert.contains(&tx.id) {
            return Err(TransactionError::Other(format!("scripted revert failure of {}", tx.id)));
        }
        self.inner.revert(tx, wallets)?;
        self.reverted.lock().unwrap().push(tx.id);
        Ok(())
    }
}
