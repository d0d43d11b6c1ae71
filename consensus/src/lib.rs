//! Consensus-side bookkeeping over wallet state.
//!
//! - [`vote_balance`]: keeps every delegate's vote balance equal to the
//!   voting weight of its voters as transactions are applied and reverted.
//! - [`roster`]: registered, resigned and eligible delegates, read through
//!   the username and resignation indices.
//! - [`error`]: consensus error types.
//!
//! Delegate ranking and round rotation are left to the forging layer.

pub mod error;
pub mod roster;
pub mod vote_balance;

pub use error::ConsensusError;
pub use roster::{DelegateEntry, DelegateRoster};
pub use vote_balance::{
    expected_vote_balances, rebuild_vote_balances, verify_vote_balances, VoteBalanceTracker,
};
