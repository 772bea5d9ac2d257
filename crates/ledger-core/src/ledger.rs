//! The shared ledger: chain, pending pool and difficulty behind one handle.
//!
//! Concurrency model:
//! - the chain sits behind an `RwLock`; readers never see a half-appended block,
//! - the pool serialises its own operations,
//! - mining holds a single slot for its whole duration and rejects a second
//!   miner with [`LedgerError::Busy`] instead of queueing it,
//! - search, validation and lookups only take the chain read lock, so they
//!   proceed alongside submissions while a block is being mined,
//! - with a store attached, a block is persisted under the chain write lock
//!   before it becomes visible, so the store never runs ahead of or behind
//!   the in-memory chain.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chain::{Chain, ChainFault, ChainStore};
use crate::config::LedgerConfig;
use crate::difficulty::DifficultyController;
use crate::error::{LedgerError, Result};
use crate::mine::{CancelToken, Miner};
use crate::pool::TransactionPool;
use crate::search::{SearchHit, SearchIndex};
use crate::{Block, BlockTemplate, Transaction};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_blocks: usize,
    pub pending_transactions: usize,
    /// Drained from the pool into the block being mined, not yet on the chain.
    pub in_flight_transactions: usize,
    pub difficulty: u32,
    pub min_difficulty: u32,
    pub max_difficulty: u32,
    pub is_valid: bool,
    pub mining: bool,
}

pub struct Ledger {
    config: LedgerConfig,
    chain: RwLock<Chain>,
    pool: TransactionPool,
    difficulty: DifficultyController,
    miner: Miner,
    store: Option<Arc<dyn ChainStore>>,
    /// `Some` while a mining attempt is in flight.
    mining: Mutex<Option<MiningJob>>,
}

struct MiningJob {
    token: CancelToken,
    in_flight: usize,
}

/// Frees the mining slot however the attempt ends.
struct MiningSlot<'a> {
    slot: &'a Mutex<Option<MiningJob>>,
}

impl Drop for MiningSlot<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

impl Ledger {
    /// Start a fresh ledger holding only the genesis block.
    pub fn new(config: LedgerConfig) -> Result<Self> {
        Self::with_chain(config, Chain::new())
    }

    /// Wrap an existing (already validated) chain.
    pub fn with_chain(config: LedgerConfig, chain: Chain) -> Result<Self> {
        config.validate()?;
        let difficulty = DifficultyController::new(
            config.default_difficulty,
            config.min_difficulty,
            config.max_difficulty,
        )?;
        Ok(Self {
            pool: TransactionPool::new(config.max_transaction_len),
            miner: Miner::new(config.nonce_batch),
            chain: RwLock::new(chain),
            store: None,
            mining: Mutex::new(None),
            difficulty,
            config,
        })
    }

    /// Persist every block appended from now on to `store`. The store must
    /// already hold the current chain, as [`crate::chain::load_or_init`] leaves it.
    pub fn with_store(mut self, store: Arc<dyn ChainStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn read_chain(&self) -> RwLockReadGuard<'_, Chain> {
        self.chain.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn mining_slot(&self) -> MutexGuard<'_, Option<MiningJob>> {
        self.mining.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a transaction to the pending pool; returns the new pool size.
    pub fn submit_transaction(&self, text: impl Into<String>) -> Result<usize> {
        self.pool.add(text)
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.pool.snapshot()
    }

    /// Drain the pool into a new block, mine it and append it.
    ///
    /// The difficulty is read once, when the slot is taken. On any failure
    /// after the drain (cancellation, the tip moving under an external
    /// `append`, or the store refusing the block) the drained batch goes
    /// back to the front of the pool.
    pub fn mine_block(&self) -> Result<Block> {
        let (token, difficulty, batch) = {
            let mut slot = self.mining_slot();
            if slot.is_some() {
                return Err(LedgerError::Busy);
            }
            let batch = self.pool.drain_nonempty()?;
            let token = CancelToken::new();
            *slot = Some(MiningJob {
                token: token.clone(),
                in_flight: batch.len(),
            });
            (token, self.difficulty.get(), batch)
        };
        let _slot = MiningSlot { slot: &self.mining };

        let template = {
            let chain = self.read_chain();
            let tip = chain.latest();
            BlockTemplate::new(
                tip.index + 1,
                unix_now().max(tip.timestamp),
                batch.clone(),
                tip.hash.clone(),
            )
        };
        info!(
            "mining block {} with {} transactions at difficulty {difficulty}",
            template.index,
            batch.len()
        );

        let block = match self.miner.mine(template, difficulty, &token) {
            Ok(block) => block,
            Err(err) => {
                self.return_batch(batch);
                return Err(err);
            }
        };

        let mut chain = self.chain.write().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = self.commit(&mut chain, block.clone()) {
            warn!("mined block {} rejected: {err}", block.index);
            self.return_batch(batch);
            return Err(err);
        }
        if let Some(job) = self.mining_slot().as_mut() {
            job.in_flight = 0;
        }
        Ok(block)
    }

    /// Put an unmined batch back at the front of the pool, under the slot
    /// lock so stats never count it both pending and in flight.
    fn return_batch(&self, batch: Vec<Transaction>) {
        let mut slot = self.mining_slot();
        self.pool.restore(batch);
        if let Some(job) = slot.as_mut() {
            job.in_flight = 0;
        }
    }

    /// Check, persist, then append. Caller holds the chain write lock.
    fn commit(&self, chain: &mut Chain, block: Block) -> Result<()> {
        chain.check_append(&block)?;
        if let Some(store) = &self.store {
            store
                .put_block(&block)
                .map_err(|err| LedgerError::Storage(format!("block {}: {err:#}", block.index)))?;
        }
        chain.append(block)
    }

    /// Cancel the in-flight mining attempt, if any. Returns whether one was running.
    pub fn cancel_mining(&self) -> bool {
        match self.mining_slot().as_ref() {
            Some(job) => {
                job.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_mining(&self) -> bool {
        self.mining_slot().is_some()
    }

    /// Extension point for blocks mined elsewhere. Persisted like mined blocks.
    pub fn append_block(&self, block: Block) -> Result<()> {
        let mut chain = self.chain.write().unwrap_or_else(PoisonError::into_inner);
        self.commit(&mut chain, block)
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.read_chain().blocks().to_vec()
    }

    pub fn block_at(&self, index: u64) -> Result<Block> {
        self.read_chain().block_at(index).cloned()
    }

    pub fn latest(&self) -> Block {
        self.read_chain().latest().clone()
    }

    pub fn len(&self) -> usize {
        self.read_chain().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_chain().is_empty()
    }

    pub fn is_valid(&self) -> bool {
        self.read_chain().is_valid()
    }

    pub fn validate(&self) -> std::result::Result<(), ChainFault> {
        self.read_chain().validate()
    }

    pub fn audit(&self) -> Vec<ChainFault> {
        self.read_chain().audit()
    }

    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        let chain = self.read_chain();
        SearchIndex::new(&chain).search(query)
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty.get()
    }

    /// Inclusive range accepted by [`set_difficulty`](Self::set_difficulty).
    pub fn difficulty_bounds(&self) -> (u32, u32) {
        self.difficulty.bounds()
    }

    /// Takes effect for mining attempts started after the call.
    pub fn set_difficulty(&self, value: i64) -> Result<u32> {
        self.difficulty.set(value)
    }

    pub fn stats(&self) -> LedgerStats {
        let (total_blocks, is_valid) = {
            let chain = self.read_chain();
            (chain.len(), chain.is_valid())
        };
        // pool and in-flight count read under the slot lock, so a drain is
        // never seen half done
        let (pending_transactions, in_flight_transactions, mining) = {
            let slot = self.mining_slot();
            let in_flight = slot.as_ref().map_or(0, |job| job.in_flight);
            (self.pool.len(), in_flight, slot.is_some())
        };
        let (min_difficulty, max_difficulty) = self.difficulty.bounds();
        LedgerStats {
            total_blocks,
            pending_transactions,
            in_flight_transactions,
            difficulty: self.difficulty.get(),
            min_difficulty,
            max_difficulty,
            is_valid,
            mining,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_chain_mut<R>(&self, f: impl FnOnce(&mut Chain) -> R) -> R {
        f(&mut self.chain.write().unwrap_or_else(PoisonError::into_inner))
    }
}
