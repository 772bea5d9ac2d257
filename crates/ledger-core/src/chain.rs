use std::fmt;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::constants::{GENESIS_PREVIOUS_HASH, GENESIS_TIMESTAMP};
use crate::error::{LedgerError, Result};
use crate::{Block, BlockTemplate};

/// Trait the storage backends implement to persist blocks.
/// This lives in `ledger-core` to avoid a circular dependency.
pub trait ChainStore: Send + Sync {
    fn put_block(&self, block: &Block) -> anyhow::Result<()>;
    fn get_block(&self, index: u64) -> anyhow::Result<Option<Block>>;
    /// Index of the highest stored block, `None` when nothing is stored.
    fn tip_height(&self) -> anyhow::Result<Option<u64>>;
    fn tip_hash(&self) -> anyhow::Result<Option<String>>;
    /// Every stored block in ascending index order.
    fn load_all(&self) -> anyhow::Result<Vec<Block>>;
    fn close(&self) -> anyhow::Result<()>;
}

/// The fixed first block: no transactions, sentinel previous hash, nonce 0.
/// Its hash is computed normally but not mined.
pub fn genesis_block() -> Block {
    BlockTemplate::new(0, GENESIS_TIMESTAMP, Vec::new(), GENESIS_PREVIOUS_HASH).seal(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    MissingGenesis,
    GenesisMismatch,
    IndexMismatch,
    BrokenLink,
    MerkleMismatch,
    HashMismatch,
    TimestampRegression,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FaultKind::MissingGenesis => "chain has no genesis block",
            FaultKind::GenesisMismatch => "genesis block differs from the fixed definition",
            FaultKind::IndexMismatch => "index does not match position",
            FaultKind::BrokenLink => "previous_hash does not match the prior block",
            FaultKind::MerkleMismatch => "merkle_root does not match transactions",
            FaultKind::HashMismatch => "hash does not match block contents",
            FaultKind::TimestampRegression => "timestamp earlier than the prior block",
        };
        f.write_str(msg)
    }
}

/// First broken invariant found at a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("block {index}: {kind}")]
pub struct ChainFault {
    pub index: u64,
    pub kind: FaultKind,
}

/// Append-only sequence of blocks starting at the genesis block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    blocks: Vec<Block>,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain {
    pub fn new() -> Self {
        Self {
            blocks: vec![genesis_block()],
        }
    }

    /// Rebuild a chain from stored blocks. The result must validate.
    pub fn from_blocks(blocks: Vec<Block>) -> Result<Self> {
        validate_blocks(&blocks).map_err(LedgerError::Corrupt)?;
        Ok(Self { blocks })
    }

    pub fn latest(&self) -> &Block {
        // never empty: constructors guarantee a genesis block
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block_at(&self, index: u64) -> Result<&Block> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.blocks.get(i))
            .ok_or(LedgerError::NotFound(index))
    }

    /// Check that `block` would extend the current tip, without appending it.
    ///
    /// Besides index and linkage, the block's own hash and merkle root must
    /// recompute and its timestamp may not precede the tip's, so a chain
    /// built only through `append` always validates.
    pub fn check_append(&self, block: &Block) -> Result<()> {
        let tip = self.latest();
        if block.index != tip.index + 1 {
            return Err(LedgerError::Index {
                expected: tip.index + 1,
                found: block.index,
            });
        }
        if block.previous_hash != tip.hash {
            return Err(LedgerError::Linkage {
                expected: tip.hash.clone(),
                found: block.previous_hash.clone(),
            });
        }
        if block.timestamp < tip.timestamp {
            return Err(LedgerError::Validation(format!(
                "block timestamp {} precedes tip timestamp {}",
                block.timestamp, tip.timestamp
            )));
        }
        if !block.has_valid_merkle_root() {
            return Err(LedgerError::Validation(
                "merkle_root does not match transactions".into(),
            ));
        }
        if !block.has_valid_hash() {
            return Err(LedgerError::Validation(
                "hash does not match block contents".into(),
            ));
        }
        Ok(())
    }

    /// Append a block that extends the current tip. See [`check_append`](Self::check_append).
    pub fn append(&mut self, block: Block) -> Result<()> {
        self.check_append(&block)?;
        info!("appended block {} ({})", block.index, block.hash);
        self.blocks.push(block);
        Ok(())
    }

    /// Walk the chain and stop at the first broken invariant.
    pub fn validate(&self) -> std::result::Result<(), ChainFault> {
        validate_blocks(&self.blocks)
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Like [`validate`](Self::validate) but keeps going, reporting the first
    /// fault of every broken block.
    pub fn audit(&self) -> Vec<ChainFault> {
        audit_blocks(&self.blocks)
    }

    #[cfg(test)]
    pub(crate) fn blocks_mut(&mut self) -> &mut Vec<Block> {
        &mut self.blocks
    }
}

fn check_block(blocks: &[Block], position: usize) -> Option<FaultKind> {
    let block = &blocks[position];
    if block.index != position as u64 {
        return Some(FaultKind::IndexMismatch);
    }
    if position == 0 {
        return (*block != genesis_block()).then_some(FaultKind::GenesisMismatch);
    }
    let prev = &blocks[position - 1];
    if block.previous_hash != prev.hash {
        return Some(FaultKind::BrokenLink);
    }
    if !block.has_valid_merkle_root() {
        return Some(FaultKind::MerkleMismatch);
    }
    if !block.has_valid_hash() {
        return Some(FaultKind::HashMismatch);
    }
    if block.timestamp < prev.timestamp {
        return Some(FaultKind::TimestampRegression);
    }
    None
}

/// Check a block sequence against the chain invariants, stopping at the
/// first failure.
pub fn validate_blocks(blocks: &[Block]) -> std::result::Result<(), ChainFault> {
    if blocks.is_empty() {
        return Err(ChainFault {
            index: 0,
            kind: FaultKind::MissingGenesis,
        });
    }
    for position in 0..blocks.len() {
        if let Some(kind) = check_block(blocks, position) {
            let fault = ChainFault {
                index: position as u64,
                kind,
            };
            warn!("chain validation failed: {fault}");
            return Err(fault);
        }
    }
    Ok(())
}

/// First fault of every broken block in the sequence.
pub fn audit_blocks(blocks: &[Block]) -> Vec<ChainFault> {
    if blocks.is_empty() {
        return vec![ChainFault {
            index: 0,
            kind: FaultKind::MissingGenesis,
        }];
    }
    (0..blocks.len())
        .filter_map(|position| {
            check_block(blocks, position).map(|kind| ChainFault {
                index: position as u64,
                kind,
            })
        })
        .collect()
}

/// Load the chain held by `store`, writing a genesis block first if the
/// store is empty. Idempotent.
pub fn load_or_init<S: ChainStore + ?Sized>(store: &S) -> anyhow::Result<Chain> {
    let blocks = store.load_all()?;
    if blocks.is_empty() {
        let chain = Chain::new();
        store.put_block(chain.latest())?;
        info!("initialised empty store with genesis block");
        return Ok(chain);
    }
    let count = blocks.len();
    let chain = Chain::from_blocks(blocks).context("stored chain failed validation")?;
    info!("loaded {count} blocks from store");
    Ok(chain)
}
