//! Pluggable per-type transaction business rules.

use crate::{StateError, WalletManager};
use forge_transactions::{Transaction, TransactionError, TransactionKind};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Business rules for one transaction kind.
///
/// `apply` and `revert` must each either succeed completely or fail without
/// touching wallet state, and `revert` must be the exact inverse of `apply`.
/// Both reindex every wallet whose indexed attributes they change.
pub trait TransactionHandler: Send + Sync {
    fn kind(&self) -> TransactionKind;

    fn apply(&self, tx: &Transaction, wallets: &mut WalletManager)
        -> Result<(), TransactionError>;

    fn revert(
        &self,
        tx: &Transaction,
        wallets: &mut WalletManager,
    ) -> Result<(), TransactionError>;
}

/// Handlers keyed by `(type_group, type_id)`.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<TransactionKind, Arc<dyn TransactionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in handlers of the core type group.
    pub fn with_core_handlers() -> Self {
        let mut registry = Self::new();
        for handler in crate::handlers::core_handlers() {
            registry.handlers.insert(handler.kind(), handler);
        }
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn TransactionHandler>) -> Result<(), StateError> {
        let kind = handler.kind();
        if self.handlers.contains_key(&kind) {
            return Err(StateError::HandlerAlreadyRegistered { kind });
        }
        self.handlers.insert(kind, handler);
        Ok(())
    }

    /// Install `handler`, returning the one it replaces.
    pub fn replace(
        &mut self,
        handler: Arc<dyn TransactionHandler>,
    ) -> Option<Arc<dyn TransactionHandler>> {
        self.handlers.insert(handler.kind(), handler)
    }

    pub fn get(&self, kind: TransactionKind) -> Result<Arc<dyn TransactionHandler>, StateError> {
        self.handlers
            .get(&kind)
            .cloned()
            .ok_or(StateError::UnknownTransactionType {
                type_group: kind.type_group,
                type_id: kind.type_id,
            })
    }

    pub fn kinds(&self) -> impl Iterator<Item = &TransactionKind> {
        self.handlers.keys()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.handlers.keys()).finish()
    }
}
