use forge_types::Amount;
use thiserror::Error;

/// Why a transaction handler refused to apply or revert a transaction.
///
/// Handlers validate before they mutate, so any of these leaves wallet state
/// untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientFunds { needed: Amount, available: Amount },

    #[error("invalid nonce: expected {expected}, got {got}")]
    InvalidNonce { expected: u64, got: u64 },

    #[error("asset does not match transaction kind {kind}")]
    UnexpectedAsset { kind: String },

    #[error("transaction requires a recipient")]
    MissingRecipient,

    #[error("amount must be positive")]
    ZeroAmount,

    #[error("transaction kind {kind} does not carry an amount")]
    UnexpectedAmount { kind: String },

    #[error("invalid username: {0}")]
    InvalidUsername(String),

    #[error("username {0} is already registered")]
    UsernameTaken(String),

    #[error("wallet is already a delegate")]
    AlreadyDelegate,

    #[error("wallet is not a delegate")]
    NotDelegate,

    #[error("delegate has already resigned")]
    AlreadyResigned,

    #[error("delegate has not resigned")]
    NotResigned,

    #[error("vote transaction must carry exactly one vote, got {0}")]
    InvalidVoteCount(usize),

    #[error("wallet has already voted")]
    AlreadyVoted,

    #[error("wallet has not voted")]
    NoVote,

    #[error("unvote does not match the current vote")]
    VoteMismatch,

    #[error("unknown delegate {0}")]
    UnknownDelegate(String),

    #[error("delegate {0} has resigned")]
    ResignedDelegate(String),

    #[error("invalid ipfs hash: {0}")]
    InvalidIpfsHash(String),

    #[error("ipfs hash {0} is already registered")]
    IpfsHashExists(String),

    #[error("ipfs hash {0} is not registered")]
    IpfsHashMissing(String),

    #[error("htlc lock {0} not found")]
    LockNotFound(String),

    #[error("htlc lock {0} already exists")]
    LockExists(String),

    #[error("htlc lock has expired")]
    LockExpired,

    #[error("htlc lock has not expired yet")]
    LockNotExpired,

    #[error("htlc expiration is already in the past")]
    InvalidExpiration,

    #[error("unlock secret does not match the lock")]
    InvalidUnlockSecret,

    #[error("only the lock recipient may claim")]
    NotLockRecipient,

    #[error("only the lock sender may refund")]
    NotLockOwner,

    #[error("no block is being applied")]
    NoCurrentBlock,

    #[error("amount overflow")]
    Overflow,

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("{0}")]
    Other(String),
}
