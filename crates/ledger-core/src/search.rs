//! Case-insensitive substring search over every mined transaction.

use serde::{Deserialize, Serialize};

use crate::chain::Chain;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub block_index: u64,
    pub block_hash: String,
    pub timestamp: u64,
    #[serde(rename = "transaction")]
    pub transaction_text: String,
}

/// Read-only view answering queries by a linear scan of the chain.
///
/// Hits come back in ascending block index, then in stored transaction
/// order. A blank query matches nothing.
pub struct SearchIndex<'a> {
    chain: &'a Chain,
}

impl<'a> SearchIndex<'a> {
    pub fn new(chain: &'a Chain) -> Self {
        Self { chain }
    }

    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        let needle = query.to_lowercase();
        let mut hits = Vec::new();
        for block in self.chain.blocks() {
            for tx in &block.transactions {
                if tx.as_str().to_lowercase().contains(&needle) {
                    hits.push(SearchHit {
                        block_index: block.index,
                        block_hash: block.hash.clone(),
                        timestamp: block.timestamp,
                        transaction_text: tx.data.clone(),
                    });
                }
            }
        }
        hits
    }
}
