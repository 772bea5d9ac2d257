use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DIFFICULTY, HASH_HEX_SIZE, MAX_DIFFICULTY, MAX_TRANSACTION_LEN, MIN_DIFFICULTY,
    NONCE_BATCH,
};
use crate::error::{LedgerError, Result};

/// Tunables for a [`crate::ledger::Ledger`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Difficulty in effect when the ledger starts.
    pub default_difficulty: u32,
    /// Lowest difficulty an administrator may set.
    pub min_difficulty: u32,
    /// Highest difficulty an administrator may set.
    pub max_difficulty: u32,
    /// Maximum transaction length, in characters.
    pub max_transaction_len: usize,
    /// Nonces searched per parallel batch. Cancellation is checked between batches.
    pub nonce_batch: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_difficulty: DEFAULT_DIFFICULTY,
            min_difficulty: MIN_DIFFICULTY,
            max_difficulty: MAX_DIFFICULTY,
            max_transaction_len: MAX_TRANSACTION_LEN,
            nonce_batch: NONCE_BATCH,
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_difficulty == 0 {
            return Err(LedgerError::Config(
                "min_difficulty must be at least 1".into(),
            ));
        }
        if self.min_difficulty > self.max_difficulty {
            return Err(LedgerError::Config(format!(
                "min_difficulty {} exceeds max_difficulty {}",
                self.min_difficulty, self.max_difficulty
            )));
        }
        if self.max_difficulty as usize > HASH_HEX_SIZE {
            return Err(LedgerError::Config(format!(
                "max_difficulty {} exceeds hash length {HASH_HEX_SIZE}",
                self.max_difficulty
            )));
        }
        if !(self.min_difficulty..=self.max_difficulty).contains(&self.default_difficulty) {
            return Err(LedgerError::Config(format!(
                "default_difficulty {} outside {}..={}",
                self.default_difficulty, self.min_difficulty, self.max_difficulty
            )));
        }
        if self.max_transaction_len == 0 {
            return Err(LedgerError::Config(
                "max_transaction_len must be positive".into(),
            ));
        }
        if self.nonce_batch == 0 {
            return Err(LedgerError::Config("nonce_batch must be positive".into()));
        }
        Ok(())
    }
}
