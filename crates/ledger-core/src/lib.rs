use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub mod chain;
pub mod config;
pub mod constants;
pub mod difficulty;
pub mod error;
pub mod ledger;
pub mod mine;
pub mod pool;
pub mod search;

pub use chain::{Chain, ChainFault, FaultKind};
pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use ledger::{Ledger, LedgerStats};
pub use mine::{CancelToken, Miner};
pub use search::{SearchHit, SearchIndex};

use constants::{EMPTY_MERKLE_MARKER, HASH_SIZE};

pub type Hash = [u8; HASH_SIZE];

/// SHA-256 over `bytes`.
pub fn sha256(bytes: &[u8]) -> Hash {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; HASH_SIZE];
    out.copy_from_slice(&digest[..]);
    out
}

/// Lowercase hex form of [`sha256`].
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(sha256(bytes))
}

/// A free-text payload. Serialized as a bare JSON string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transaction {
    pub data: String,
}

impl Transaction {
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.data
    }

    fn leaf_hash(&self) -> Hash {
        sha256(self.data.as_bytes())
    }
}

impl From<&str> for Transaction {
    fn from(data: &str) -> Self {
        Self::new(data)
    }
}

impl From<String> for Transaction {
    fn from(data: String) -> Self {
        Self::new(data)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.data)
    }
}

/// Merkle root over the ordered transactions.
///
/// Leaves are `sha256(text)`. A parent is the digest of its children's hex
/// strings concatenated; an odd node at any level is paired with itself.
/// An empty list hashes [`EMPTY_MERKLE_MARKER`].
pub fn merkle_root(txs: &[Transaction]) -> Hash {
    if txs.is_empty() {
        return sha256(EMPTY_MERKLE_MARKER);
    }
    let mut level: Vec<Hash> = txs.iter().map(Transaction::leaf_hash).collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let (a, b) = if pair.len() == 2 {
                (pair[0], pair[1])
            } else {
                (pair[0], pair[0])
            };
            let mut joined = hex::encode(a);
            joined.push_str(&hex::encode(b));
            next.push(sha256(joined.as_bytes()));
        }
        level = next;
    }
    level[0]
}

pub fn merkle_root_hex(txs: &[Transaction]) -> String {
    hex::encode(merkle_root(txs))
}

/// A block that has everything except its proof of work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTemplate {
    pub index: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub merkle_root: String,
}

impl BlockTemplate {
    pub fn new(
        index: u64,
        timestamp: u64,
        transactions: Vec<Transaction>,
        previous_hash: impl Into<String>,
    ) -> Self {
        let merkle_root = merkle_root_hex(&transactions);
        Self {
            index,
            timestamp,
            transactions,
            previous_hash: previous_hash.into(),
            merkle_root,
        }
    }

    pub fn header_hasher(&self) -> pow::HeaderHasher {
        pow::HeaderHasher::new(
            self.index,
            self.timestamp,
            &self.merkle_root,
            &self.previous_hash,
        )
    }

    /// Stamp the template with `nonce` and its resulting hash.
    pub fn seal(self, nonce: u64) -> Block {
        let hash = hex::encode(self.header_hasher().hash(nonce));
        Block {
            index: self.index,
            timestamp: self.timestamp,
            transactions: self.transactions,
            previous_hash: self.previous_hash,
            merkle_root: self.merkle_root,
            nonce,
            hash,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub merkle_root: String,
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    /// Recompute the hash from the stored header fields.
    pub fn compute_hash(&self) -> String {
        let hasher = pow::HeaderHasher::new(
            self.index,
            self.timestamp,
            &self.merkle_root,
            &self.previous_hash,
        );
        hex::encode(hasher.hash(self.nonce))
    }

    /// Recompute the merkle root from the stored transactions.
    pub fn compute_merkle_root(&self) -> String {
        merkle_root_hex(&self.transactions)
    }

    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    pub fn has_valid_merkle_root(&self) -> bool {
        self.merkle_root == self.compute_merkle_root()
    }

    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        pow::leading_zero_digits(&self.hash) >= difficulty
    }
}

pub mod pow {
    use super::Hash;
    use crate::constants::{HASH_SIZE, HEADER_FIELD_SEPARATOR};
    use sha2::{Digest, Sha256};

    /// The exact string hashed for a block header:
    /// `index|timestamp|merkle_root|previous_hash|nonce`, integers in decimal.
    pub fn header_preimage(
        index: u64,
        timestamp: u64,
        merkle_root: &str,
        previous_hash: &str,
        nonce: u64,
    ) -> String {
        let sep = HEADER_FIELD_SEPARATOR;
        format!("{index}{sep}{timestamp}{sep}{merkle_root}{sep}{previous_hash}{sep}{nonce}")
    }

    /// Hashes a header for many nonces without re-feeding the fixed fields.
    #[derive(Clone)]
    pub struct HeaderHasher {
        prefix: Sha256,
    }

    impl HeaderHasher {
        pub fn new(index: u64, timestamp: u64, merkle_root: &str, previous_hash: &str) -> Self {
            let sep = HEADER_FIELD_SEPARATOR;
            let mut prefix = Sha256::new();
            prefix.update(format!(
                "{index}{sep}{timestamp}{sep}{merkle_root}{sep}{previous_hash}{sep}"
            ));
            Self { prefix }
        }

        pub fn hash(&self, nonce: u64) -> Hash {
            let mut hasher = self.prefix.clone();
            hasher.update(nonce.to_string().as_bytes());
            let digest = hasher.finalize();
            let mut out = [0u8; HASH_SIZE];
            out.copy_from_slice(&digest[..]);
            out
        }
    }

    /// Leading zero hex digits of a raw digest.
    pub fn count_leading_zero_nibbles(hash: &Hash) -> u32 {
        let mut total = 0u32;
        for b in hash {
            if *b == 0 {
                total += 2;
            } else {
                if *b < 0x10 {
                    total += 1;
                }
                break;
            }
        }
        total
    }

    /// Leading `'0'` characters of a hex string.
    pub fn leading_zero_digits(hex: &str) -> u32 {
        hex.bytes().take_while(|b| *b == b'0').count() as u32
    }

    pub fn meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
        count_leading_zero_nibbles(hash) >= difficulty
    }
}
