use anyhow::{Context, Result};
use ledger_core::{chain::ChainStore, Block};
use sled::{Db, IVec, Tree};
use std::path::Path;
use tracing::{debug, info};

const TREE_BLOCKS: &str = "blocks";
const KEY_TIP_HEIGHT: &[u8] = b"tip_height";
const KEY_TIP_HASH: &[u8] = b"tip_hash";

/// Blocks keyed by big-endian index, bincode encoded, plus the tip height
/// and hash in the default tree.
#[derive(Clone)]
pub struct SledStore {
  db: Db,
  blocks: Tree,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let db = sled::open(path).with_context(|| format!("opening sled store at {}", path.display()))?;
    let blocks = db.open_tree(TREE_BLOCKS)?;
    info!("sled store opened at {}", path.display());
    Ok(Self { db, blocks })
  }

  /// Remove every stored block and the tip markers.
  pub fn clear(&self) -> Result<()> {
    self.blocks.clear()?;
    self.db.remove(KEY_TIP_HEIGHT)?;
    self.db.remove(KEY_TIP_HASH)?;
    self.db.flush()?;
    Ok(())
  }

  pub fn block_count(&self) -> usize {
    self.blocks.len()
  }
}

fn decode_block(bytes: &IVec) -> Result<Block> {
  bincode::deserialize(bytes).context("decoding stored block")
}

impl ChainStore for SledStore {
  fn put_block(&self, block: &Block) -> Result<()> {
    let key = block.index.to_be_bytes();
    let bytes = bincode::serialize(block)?;
    self.blocks.insert(&key[..], bytes)?;

    // only move the tip forward
    let tip = self.tip_height()?;
    if tip.map_or(true, |height| block.index >= height) {
      self.db.insert(KEY_TIP_HEIGHT, &key[..])?;
      self.db.insert(KEY_TIP_HASH, block.hash.as_bytes())?;
    }

    self.db.flush()?;
    debug!("stored block {}", block.index);
    Ok(())
  }

  fn get_block(&self, index: u64) -> Result<Option<Block>> {
    self
      .blocks
      .get(index.to_be_bytes())?
      .map(|ivec| decode_block(&ivec))
      .transpose()
  }

  fn tip_height(&self) -> Result<Option<u64>> {
    self
      .db
      .get(KEY_TIP_HEIGHT)?
      .map(|v| {
        let arr = <[u8; 8]>::try_from(&v[..]).context("tip height is not 8 bytes")?;
        Ok(u64::from_be_bytes(arr))
      })
      .transpose()
  }

  fn tip_hash(&self) -> Result<Option<String>> {
    self
      .db
      .get(KEY_TIP_HASH)?
      .map(|v| String::from_utf8(v.to_vec()).context("tip hash is not utf-8"))
      .transpose()
  }

  fn load_all(&self) -> Result<Vec<Block>> {
    // big-endian keys iterate in index order
    self
      .blocks
      .iter()
      .values()
      .map(|value| decode_block(&value?))
      .collect()
  }

  fn close(&self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }
}
