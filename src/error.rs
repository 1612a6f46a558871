//! Error types for MyCoin

use thiserror::Error;

/// Coarse classification of a [`ChainError`], used by callers (the API layer
/// in particular) to decide how to report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Admission,
    Proposer,
    Staking,
    Integrity,
    Persistence,
    Crypto,
    Wallet,
    Config,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChainError {
    #[error("Insufficient balance: {address} has {available}, needs {required}")]
    InsufficientBalance {
        address: String,
        available: f64,
        required: f64,
    },
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Transaction {0} already exists in pool")]
    DuplicateTransaction(String),
    #[error("Transaction pool is full (capacity {0})")]
    MempoolFull(usize),
    #[error("Cryptographic error: {0}")]
    CryptoError(String),
    #[error("{0} is not a validator")]
    NotAValidator(String),
    #[error("{candidate} is not the selected validator (selected: {selected})")]
    NotSelectedValidator { candidate: String, selected: String },
    #[error("No eligible validators available")]
    NoEligibleValidators,
    #[error("Minimum stake amount is {minimum:.2}, got {amount:.2}")]
    BelowMinimumStake { minimum: f64, amount: f64 },
    #[error("Maximum number of validators ({0}) reached")]
    ValidatorPoolFull(usize),
    #[error("Validator {0} already exists")]
    AlreadyStaked(String),
    #[error("Validator {0} not found")]
    ValidatorNotFound(String),
    #[error("Insufficient balance to stake: {address} has {available}, needs {required}")]
    InsufficientStakeBalance {
        address: String,
        available: f64,
        required: f64,
    },
    #[error("Chain integrity violated at block {index}: {reason}")]
    IntegrityError { index: u64, reason: String },
    #[error("Persistence error: {0}")]
    PersistenceError(String),
    #[error("Wallet error: {0}")]
    WalletError(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainError::InsufficientBalance { .. }
            | ChainError::InvalidTransaction(_)
            | ChainError::DuplicateTransaction(_)
            | ChainError::MempoolFull(_) => ErrorKind::Admission,
            ChainError::NotAValidator(_)
            | ChainError::NotSelectedValidator { .. }
            | ChainError::NoEligibleValidators => ErrorKind::Proposer,
            ChainError::BelowMinimumStake { .. }
            | ChainError::ValidatorPoolFull(_)
            | ChainError::AlreadyStaked(_)
            | ChainError::ValidatorNotFound(_)
            | ChainError::InsufficientStakeBalance { .. } => ErrorKind::Staking,
            ChainError::IntegrityError { .. } => ErrorKind::Integrity,
            ChainError::PersistenceError(_) => ErrorKind::Persistence,
            ChainError::CryptoError(_) => ErrorKind::Crypto,
            ChainError::WalletError(_) => ErrorKind::Wallet,
            ChainError::InvalidConfig(_) => ErrorKind::Config,
        }
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::PersistenceError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::PersistenceError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
