use thiserror::Error;

use crate::chain::ChainFault;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("invalid transaction: {0}")]
    Validation(String),

    #[error("no pending transactions to mine")]
    EmptyPool,

    #[error("a mining operation is already in progress")]
    Busy,

    #[error("mining was cancelled")]
    Cancelled,

    #[error("block does not link to the chain tip: expected previous hash {expected}, found {found}")]
    Linkage { expected: String, found: String },

    #[error("unexpected block index: expected {expected}, found {found}")]
    Index { expected: u64, found: u64 },

    #[error("block {0} not found")]
    NotFound(u64),

    #[error("difficulty {value} out of range, must be between {min} and {max}")]
    Range { value: i64, min: u32, max: u32 },

    #[error("nonce space exhausted without satisfying the difficulty target")]
    NonceSpaceExhausted,

    #[error("failed to persist block: {0}")]
    Storage(String),

    #[error("chain failed validation at {0}")]
    Corrupt(ChainFault),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
