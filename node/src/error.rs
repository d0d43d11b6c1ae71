use forge_types::BlockId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("wallet state error: {0}")]
    State(#[from] forge_state::StateError),

    #[error("consensus error: {0}")]
    Consensus(#[from] forge_consensus::ConsensusError),

    /// State can no longer be trusted; the host must stop ingesting.
    #[error("fatal error at block {block}: {source}")]
    Fatal {
        block: BlockId,
        #[source]
        source: Box<NodeError>,
    },

    #[error("node halted: {0}")]
    Halted(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wallet state lock poisoned")]
    LockPoisoned,
}

impl NodeError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. } | Self::Halted(_))
    }
}
