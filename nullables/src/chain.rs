//! Consecutive block fixtures.

use crate::NullClock;
use forge_crypto::keypair_from_seed;
use forge_transactions::{Block, Transaction, TransactionError};
use forge_types::{Amount, PublicKey};

/// Seconds between consecutive blocks.
pub const BLOCK_TIME: u64 = 8;

/// Builds a chain of blocks forged by one generator, one height at a time.
pub struct ChainBuilder {
    generator: PublicKey,
    reward: Amount,
    height: u64,
    clock: NullClock,
}

impl ChainBuilder {
    pub fn new(generator: PublicKey) -> Self {
        Self {
            generator,
            reward: Amount::ZERO,
            height: 0,
            clock: NullClock::new(0),
        }
    }

    /// A builder whose generator is derived from `seed`.
    pub fn from_seed(seed: u8) -> Self {
        Self::new(keypair_from_seed(&[seed; 32]).public)
    }

    pub fn reward(mut self, reward: Amount) -> Self {
        self.reward = reward;
        self
    }

    pub fn generator(&self) -> PublicKey {
        self.generator
    }

    /// Height of the last block built, zero before the first.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// The next block; the first call builds height 1.
    pub fn next_block(&mut self, transactions: Vec<Transaction>) -> Result<Block, TransactionError> {
        self.height += 1;
        self.clock.advance(BLOCK_TIME);
        Block::assemble(
            self.height,
            self.clock.now(),
            self.generator,
            self.reward,
            transactions,
        )
    }
}
