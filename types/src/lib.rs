//! Fundamental types for the forge wallet-state engine.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! addresses, public keys, block and transaction identifiers, amounts and timestamps.

pub mod address;
pub mod amount;
pub mod block;
pub mod error;
pub mod hash;
pub mod keys;
mod serde_hex;
pub mod time;

pub use address::Address;
pub use amount::Amount;
pub use block::BlockId;
pub use error::TypesError;
pub use hash::TransactionId;
pub use keys::{KeyPair, PrivateKey, PublicKey};
pub use time::Timestamp;
