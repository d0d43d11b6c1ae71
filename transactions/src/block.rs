//! Blocks as delivered by block ingestion.

use crate::{Transaction, TransactionError};
use forge_types::{Amount, BlockId, PublicKey, Timestamp};
use serde::{Deserialize, Serialize};

/// Everything about a block except its transactions.
///
/// While a block is being applied the manager exposes its header as the
/// current-block context, which height-dependent handler rules read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub id: BlockId,
    pub height: u64,
    pub timestamp: Timestamp,
    pub generator_public_key: PublicKey,
    pub reward: Amount,
    pub total_fee: Amount,
}

impl BlockHeader {
    /// Amount credited to the generator: reward + total fee.
    pub fn generator_credit(&self) -> Option<Amount> {
        self.reward.checked_add(self.total_fee)
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 1
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Assemble a block, summing transaction fees into `total_fee` and
    /// deriving the block id from the header fields and transaction ids.
    pub fn assemble(
        height: u64,
        timestamp: Timestamp,
        generator_public_key: PublicKey,
        reward: Amount,
        transactions: Vec<Transaction>,
    ) -> Result<Self, TransactionError> {
        let total_fee = transactions
            .iter()
            .try_fold(Amount::ZERO, |acc, tx| acc.checked_add(tx.fee))
            .ok_or(TransactionError::Overflow)?;

        let mut parts: Vec<&[u8]> = Vec::with_capacity(transactions.len() + 1);
        let height_bytes = height.to_le_bytes();
        parts.push(&height_bytes);
        parts.push(generator_public_key.as_bytes());
        for tx in &transactions {
            parts.push(tx.id.as_bytes());
        }
        let id = BlockId::new(forge_crypto::blake2b_256_multi(&parts));

        Ok(Self {
            header: BlockHeader {
                id,
                height,
                timestamp,
                generator_public_key,
                reward,
                total_fee,
            },
            transactions,
        })
    }

    pub fn id(&self) -> &BlockId {
        &self.header.id
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }
}
