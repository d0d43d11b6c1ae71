//! Wallet state for a delegated-proof-of-stake chain.
//!
//! The [`WalletManager`] owns every [`Wallet`] and the derived indices over
//! them, and applies blocks to that state all-or-nothing. Per-type business
//! rules live behind [`TransactionHandler`]; vote-balance bookkeeping lives
//! behind [`ConsensusNotifier`].

pub mod attributes;
mod engine;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod index;
pub mod manager;
pub mod notifier;
pub mod snapshot;
pub mod wallet;

pub use attributes::{
    AttributeKind, DelegateInfo, HtlcLock, HtlcState, SettledLock, WalletAttributes,
};
pub use error::StateError;
pub use handler::{HandlerRegistry, TransactionHandler};
pub use index::{IndexName, Indexer, WalletIndex};
pub use manager::WalletManager;
pub use notifier::{ConsensusNotifier, TransactionEffect};
pub use snapshot::StateSnapshot;
pub use wallet::Wallet;
