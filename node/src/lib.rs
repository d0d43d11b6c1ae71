//! Forge node host.
//!
//! Wires the wallet-state engine into a running node:
//! - [`BlockIngestor`] applies and reverts blocks against the canonical
//!   state and turns fatal state errors into a halt signal
//! - [`PoolView`] applies pool transactions speculatively on a fork
//! - [`NodeConfig`] and [`init_logging`] cover configuration and logging

pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod pool;

pub use config::NodeConfig;
pub use error::NodeError;
pub use ingest::{BlockIngestor, BlockReceipt};
pub use logging::{init_logging, LogFormat};
pub use pool::PoolView;
