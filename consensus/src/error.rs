use forge_state::StateError;
use forge_types::Amount;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("delegate {0} not found")]
    DelegateNotFound(String),

    #[error("vote balance of {delegate} is {recorded}, voters add up to {expected}")]
    VoteBalanceMismatch {
        delegate: String,
        recorded: Amount,
        expected: Amount,
    },

    #[error("vote balance overflow for {0}")]
    Overflow(String),

    #[error(transparent)]
    State(#[from] StateError),
}
