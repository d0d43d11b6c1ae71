//! Block ingestion into the canonical wallet state.
//!
//! The ingestor owns the canonical [`WalletManager`] behind a `RwLock`:
//! blocks are applied and reverted under the write lock while pool views and
//! queries take the read lock. A fatal state error (unknown generator,
//! failed rollback, drifted vote balances) raises the halt signal and every
//! later block is refused.

use crate::{NodeConfig, NodeError};
use forge_consensus::verify_vote_balances;
use forge_state::{StateSnapshot, WalletManager};
use forge_transactions::Block;
use forge_utils::StatsCounter;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub const BLOCKS_APPLIED: &str = "blocks_applied";
pub const BLOCKS_REVERTED: &str = "blocks_reverted";
pub const BLOCKS_REJECTED: &str = "blocks_rejected";
pub const WALLETS_PURGED: &str = "wallets_purged";
pub const FATAL_ERRORS: &str = "fatal_errors";

/// What happened to an ingested block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockReceipt {
    pub height: u64,
    pub transactions: usize,
    pub purged: usize,
}

pub struct BlockIngestor {
    wallets: Arc<RwLock<WalletManager>>,
    config: NodeConfig,
    height: AtomicU64,
    halt: Mutex<Option<String>>,
    stats: StatsCounter,
}

impl BlockIngestor {
    pub fn new(wallets: WalletManager, config: NodeConfig) -> Self {
        let wallets = wallets.with_genesis_height(config.genesis_height);
        Self {
            wallets: Arc::new(RwLock::new(wallets)),
            config,
            height: AtomicU64::new(0),
            halt: Mutex::new(None),
            stats: StatsCounter::new(&[
                BLOCKS_APPLIED,
                BLOCKS_REVERTED,
                BLOCKS_REJECTED,
                WALLETS_PURGED,
                FATAL_ERRORS,
            ]),
        }
    }

    /// Shared handle for readers such as the transaction pool.
    pub fn wallets(&self) -> Arc<RwLock<WalletManager>> {
        Arc::clone(&self.wallets)
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, WalletManager>, NodeError> {
        self.wallets.read().map_err(|_| NodeError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, WalletManager>, NodeError> {
        self.wallets.write().map_err(|_| NodeError::LockPoisoned)
    }

    /// Height of the last applied block, zero before genesis.
    pub fn height(&self) -> u64 {
        self.height.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> &StatsCounter {
        &self.stats
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Why ingestion stopped, if it did.
    pub fn halt_reason(&self) -> Option<String> {
        self.halt.lock().ok().and_then(|reason| reason.clone())
    }

    pub fn is_halted(&self) -> bool {
        self.halt_reason().is_some()
    }

    pub fn apply(&self, block: &Block) -> Result<BlockReceipt, NodeError> {
        self.ensure_running()?;
        let mut wallets = self.write()?;

        if let Err(err) = wallets.apply_block(block) {
            return Err(self.reject(block, err.is_fatal(), err.into()));
        }
        // The block is in the state even if the audit fails, so the height
        // follows it before the fatal error is raised.
        self.height.store(block.height(), Ordering::Release);
        if let Err(err) = self.check_vote_balances(&wallets) {
            return Err(self.reject(block, true, err));
        }

        let purged = if self.config.purge_empty_wallets {
            wallets.purge_empty()
        } else {
            0
        };
        drop(wallets);

        self.stats.increment(BLOCKS_APPLIED);
        self.stats.add(WALLETS_PURGED, purged as u64);
        tracing::info!(
            block = %block.id(),
            height = block.height(),
            transactions = block.transactions.len(),
            purged,
            "ingested block"
        );
        Ok(BlockReceipt {
            height: block.height(),
            transactions: block.transactions.len(),
            purged,
        })
    }

    /// Revert the last applied block.
    pub fn revert(&self, block: &Block) -> Result<BlockReceipt, NodeError> {
        self.ensure_running()?;
        let mut wallets = self.write()?;

        if let Err(err) = wallets.revert_block(block) {
            return Err(self.reject(block, err.is_fatal(), err.into()));
        }
        self.height
            .store(block.height().saturating_sub(1), Ordering::Release);
        if let Err(err) = self.check_vote_balances(&wallets) {
            return Err(self.reject(block, true, err));
        }
        drop(wallets);

        self.stats.increment(BLOCKS_REVERTED);
        tracing::info!(block = %block.id(), height = block.height(), "reverted block");
        Ok(BlockReceipt {
            height: block.height(),
            transactions: block.transactions.len(),
            purged: 0,
        })
    }

    /// Capture the canonical state at the current height.
    pub fn snapshot(&self) -> Result<StateSnapshot, NodeError> {
        let wallets = self.read()?;
        Ok(StateSnapshot::capture(&wallets, self.height())?)
    }

    /// Replace the canonical state with `snapshot` and resume from its height.
    pub fn restore(&self, snapshot: StateSnapshot) -> Result<(), NodeError> {
        let height = snapshot.height;
        let mut wallets = self.write()?;
        snapshot.restore(&mut wallets)?;
        self.height.store(height, Ordering::Release);
        Ok(())
    }

    fn ensure_running(&self) -> Result<(), NodeError> {
        match self.halt_reason() {
            Some(reason) => Err(NodeError::Halted(reason)),
            None => Ok(()),
        }
    }

    fn check_vote_balances(&self, wallets: &WalletManager) -> Result<(), NodeError> {
        if self.config.verify_vote_balances {
            verify_vote_balances(wallets)?;
        }
        Ok(())
    }

    fn reject(&self, block: &Block, fatal: bool, err: NodeError) -> NodeError {
        if !fatal {
            self.stats.increment(BLOCKS_REJECTED);
            tracing::warn!(block = %block.id(), height = block.height(), error = %err, "rejected block");
            return err;
        }

        self.stats.increment(FATAL_ERRORS);
        tracing::error!(block = %block.id(), height = block.height(), error = %err, "fatal wallet state error");
        if self.config.halt_on_fatal {
            if let Ok(mut halt) = self.halt.lock() {
                halt.get_or_insert_with(|| err.to_string());
            }
        }
        NodeError::Fatal {
            block: *block.id(),
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_consensus::VoteBalanceTracker;
    use forge_crypto::{derive_address, keypair_from_seed};
    use forge_nullables::ChainBuilder;
    use forge_state::HandlerRegistry;
    use forge_transactions::TransactionBuilder;
    use forge_types::{Amount, PublicKey};

    fn key(seed: u8) -> PublicKey {
        keypair_from_seed(&[seed; 32]).public
    }

    fn ingestor(config: NodeConfig) -> BlockIngestor {
        let mut wallets = WalletManager::new(
            Arc::new(HandlerRegistry::with_core_handlers()),
            Arc::new(VoteBalanceTracker::new()),
        );
        wallets
            .find_by_public_key(&key(1))
            .set_balance(Amount::new(100));
        BlockIngestor::new(wallets, config)
    }

    #[test]
    fn applies_and_reverts_blocks() {
        let ingestor = ingestor(NodeConfig::default());
        let mut chain = ChainBuilder::from_seed(9);
        let genesis = chain
            .next_block(vec![TransactionBuilder::transfer(
                key(1),
                derive_address(&key(2)),
                Amount::new(40),
            )
            .build()
            .unwrap()])
            .unwrap();

        let receipt = ingestor.apply(&genesis).unwrap();
        assert_eq!(receipt.height, 1);
        assert_eq!(receipt.transactions, 1);
        assert_eq!(ingestor.height(), 1);
        assert_eq!(ingestor.read().unwrap().get_nonce(&key(1)), 1);

        ingestor.revert(&genesis).unwrap();
        assert_eq!(ingestor.height(), 0);
        assert_eq!(ingestor.stats().get(BLOCKS_APPLIED), 1);
        assert_eq!(ingestor.stats().get(BLOCKS_REVERTED), 1);
    }

    #[test]
    fn recoverable_errors_do_not_halt() {
        let ingestor = ingestor(NodeConfig::default());
        let overspend = ChainBuilder::from_seed(9)
            .next_block(vec![TransactionBuilder::transfer(
                key(1),
                derive_address(&key(2)),
                Amount::new(500),
            )
            .build()
            .unwrap()])
            .unwrap();

        let err = ingestor.apply(&overspend).unwrap_err();
        assert!(matches!(err, NodeError::State(_)));
        assert!(!ingestor.is_halted());
        assert_eq!(ingestor.stats().get(BLOCKS_REJECTED), 1);
    }

    #[test]
    fn unknown_generator_halts_ingestion() {
        let ingestor = ingestor(NodeConfig::default());
        let mut chain = ChainBuilder::from_seed(9);
        chain.next_block(vec![]).unwrap();
        let orphan = chain.next_block(vec![]).unwrap();

        let err = ingestor.apply(&orphan).unwrap_err();
        assert!(matches!(err, NodeError::Fatal { .. }));
        assert!(ingestor.is_halted());

        let genesis = ChainBuilder::from_seed(9).next_block(vec![]).unwrap();
        assert!(matches!(ingestor.apply(&genesis), Err(NodeError::Halted(_))));
        assert_eq!(ingestor.stats().get(FATAL_ERRORS), 1);
    }

    #[test]
    fn halting_can_be_disabled() {
        let config = NodeConfig {
            halt_on_fatal: false,
            ..NodeConfig::default()
        };
        let ingestor = ingestor(config);
        let mut chain = ChainBuilder::from_seed(9);
        chain.next_block(vec![]).unwrap();
        let orphan = chain.next_block(vec![]).unwrap();

        assert!(ingestor.apply(&orphan).unwrap_err().is_fatal());
        assert!(!ingestor.is_halted());
    }

    #[test]
    fn failed_audit_still_reports_the_applied_height() {
        let config = NodeConfig {
            verify_vote_balances: true,
            halt_on_fatal: false,
            ..NodeConfig::default()
        };
        let ingestor = ingestor(config);
        let mut chain = ChainBuilder::from_seed(9);
        let delegate = chain.generator();
        let genesis = chain
            .next_block(vec![TransactionBuilder::delegate_registration(delegate, "forger")
                .build()
                .unwrap()])
            .unwrap();
        ingestor.apply(&genesis).unwrap();
        ingestor
            .write()
            .unwrap()
            .set_vote_balance(&delegate, Amount::new(5))
            .unwrap();

        let next = chain.next_block(vec![]).unwrap();
        let err = ingestor.apply(&next).unwrap_err();
        assert!(err.is_fatal());
        assert!(!ingestor.is_halted());
        assert_eq!(ingestor.height(), 2);
        let produced = ingestor
            .read()
            .unwrap()
            .wallet_by_public_key(&delegate)
            .and_then(|w| w.delegate().map(|d| d.produced_blocks));
        assert_eq!(produced, Some(2));

        let err = ingestor.revert(&next).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(ingestor.height(), 1);
    }

    #[test]
    fn purges_empty_wallets_when_configured() {
        let config = NodeConfig {
            purge_empty_wallets: true,
            ..NodeConfig::default()
        };
        let ingestor = ingestor(config);
        ingestor.write().unwrap().find_by_public_key(&key(3));

        let genesis = ChainBuilder::from_seed(9)
            .reward(Amount::new(1))
            .next_block(vec![])
            .unwrap();
        let receipt = ingestor.apply(&genesis).unwrap();
        assert_eq!(receipt.purged, 1);
        assert!(!ingestor.read().unwrap().has_by_public_key(&key(3)));
        assert_eq!(ingestor.stats().get(WALLETS_PURGED), 1);
    }

    #[test]
    fn snapshot_restores_height_and_wallets() {
        let source = ingestor(NodeConfig::default());
        let genesis = ChainBuilder::from_seed(9)
            .reward(Amount::new(7))
            .next_block(vec![])
            .unwrap();
        source.apply(&genesis).unwrap();
        let snapshot = source.snapshot().unwrap();

        let target = ingestor(NodeConfig::default());
        target.restore(snapshot).unwrap();
        assert_eq!(target.height(), 1);
        let wallets = target.read().unwrap();
        assert_eq!(
            wallets.wallet_by_public_key(&key(9)).unwrap().balance(),
            Amount::new(7)
        );
    }
}
