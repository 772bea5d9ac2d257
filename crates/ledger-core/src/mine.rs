use crate::{
    constants::NONCE_BATCH,
    error::{LedgerError, Result},
    pow::meets_difficulty,
    Block, BlockTemplate,
};
use rayon::prelude::*;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, info, warn};

/// Shared flag used to abort an in-flight mining search.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Proof-of-work search over a [`BlockTemplate`].
#[derive(Clone, Debug)]
pub struct Miner {
    nonce_batch: u64,
}

impl Default for Miner {
    fn default() -> Self {
        Self::new(NONCE_BATCH)
    }
}

impl Miner {
    pub fn new(nonce_batch: u64) -> Self {
        Self {
            nonce_batch: nonce_batch.max(1),
        }
    }

    /// Find the smallest nonce whose header hash has at least `difficulty`
    /// leading zero hex digits.
    ///
    /// Nonces are searched in consecutive batches. Each batch is split across
    /// the rayon pool with `find_first`, so the winner is always the lowest
    /// qualifying nonce regardless of thread scheduling. `cancel` is polled
    /// between batches.
    pub fn mine(
        &self,
        template: BlockTemplate,
        difficulty: u32,
        cancel: &CancelToken,
    ) -> Result<Block> {
        let hasher = template.header_hasher();
        let mut start = 0u64;

        loop {
            if cancel.is_cancelled() {
                warn!("mining of block {} cancelled at nonce {start}", template.index);
                return Err(LedgerError::Cancelled);
            }

            let end = start.saturating_add(self.nonce_batch);
            let found = (start..end)
                .into_par_iter()
                .find_first(|nonce| meets_difficulty(&hasher.hash(*nonce), difficulty));

            if let Some(nonce) = found {
                let block = template.seal(nonce);
                info!(
                    "Mined block {} with nonce {} and hash {} (difficulty {})",
                    block.index, nonce, block.hash, difficulty
                );
                return Ok(block);
            }
            if end == u64::MAX {
                return Err(LedgerError::NonceSpaceExhausted);
            }
            debug!("block {}: no solution below nonce {end}", template.index);
            start = end;
        }
    }
}

/// Mine `template` to completion with default batching and no cancellation.
pub fn mine_block(template: BlockTemplate, difficulty: u32) -> Result<Block> {
    Miner::default().mine(template, difficulty, &CancelToken::new())
}
