pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;

/// `previous_hash` carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";
/// Fixed so that the genesis block is the same value on every node.
pub const GENESIS_TIMESTAMP: u64 = 0;

/// Preimage whose digest is the merkle root of an empty transaction list.
pub const EMPTY_MERKLE_MARKER: &[u8] = b"";

/// Separator between header fields in the hashed preimage.
pub const HEADER_FIELD_SEPARATOR: char = '|';

pub const DEFAULT_DIFFICULTY: u32 = 4;
pub const MIN_DIFFICULTY: u32 = 1;
pub const MAX_DIFFICULTY: u32 = 6;
pub const MAX_TRANSACTION_LEN: usize = 500;
pub const NONCE_BATCH: u64 = 1 << 16;
