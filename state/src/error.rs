use forge_transactions::{TransactionError, TransactionKind};
use forge_types::{BlockId, TransactionId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("wallet index {0} is already registered")]
    IndexAlreadyRegistered(String),

    #[error("wallet index {0} not found")]
    IndexNotFound(String),

    #[error("wallet index {0} is a standard index and cannot be unregistered")]
    StandardIndex(String),

    #[error("failed to lookup generator {generator} of block {block} at height {height}")]
    ConsistencyViolation {
        generator: String,
        block: BlockId,
        height: u64,
    },

    #[error("no handler registered for transaction type {type_id} in group {type_group}")]
    UnknownTransactionType { type_group: u32, type_id: u16 },

    #[error("a handler for transaction type {kind} is already registered")]
    HandlerAlreadyRegistered { kind: TransactionKind },

    #[error("failed to apply transaction {id}: {source}")]
    TransactionApply {
        id: TransactionId,
        #[source]
        source: TransactionError,
    },

    #[error("failed to revert transaction {id}: {source}")]
    TransactionRevert {
        id: TransactionId,
        #[source]
        source: TransactionError,
    },

    #[error("vote balance error: {0}")]
    VoteBalance(String),

    #[error("wallet not found: {0}")]
    UnknownWallet(String),

    #[error("arithmetic overflow: {0}")]
    Overflow(String),

    #[error("block {current} is still being processed")]
    BlockInProgress { current: BlockId },

    #[error("fork is stale: canonical state moved on since it was taken")]
    StaleFork,

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("rollback of block {block} failed ({rollback}) while handling: {cause}")]
    RollbackFailed {
        block: BlockId,
        cause: Box<StateError>,
        rollback: Box<StateError>,
    },
}

impl StateError {
    /// Whether the host must halt: state can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConsistencyViolation { .. } | Self::RollbackFailed { .. }
        )
    }
}
