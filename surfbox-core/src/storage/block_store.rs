use crate::error::{Result, SurfError};
use crate::model::Block;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

/// BlockStore is one shard of content-addressed block storage.
/// Blocks are kept in memory and keyed by the SHA256 of their data.
#[derive(Default)]
pub struct BlockStore {
    blocks: DashMap<String, Block>,
}

impl BlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve a block by its hash
    pub fn get_block(&self, hash: &str) -> Result<Block> {
        self.blocks
            .get(hash)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SurfError::BlockNotFound(hash.to_string()))
    }

    /// Store a block under the hash of its data.
    /// The key is recomputed here; whatever hash the caller attached is ignored.
    pub fn put_block(&self, block: Block) -> bool {
        let hash = compute_hash(&block.data);
        let size = block.data.len() as u64;

        self.blocks.insert(
            hash.clone(),
            Block {
                hash: hash.clone(),
                data: block.data,
                size,
            },
        );

        tracing::debug!("Stored block {} ({} bytes)", hash, size);
        true
    }

    /// Returns the subsequence of `hashes` present in this store, in input order.
    pub fn has_blocks(&self, hashes: &[String]) -> Vec<String> {
        hashes
            .iter()
            .filter(|hash| self.blocks.contains_key(hash.as_str()))
            .cloned()
            .collect()
    }

    /// All stored hashes, in no particular order.
    pub fn get_block_hashes(&self) -> Vec<String> {
        self.blocks.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Compute SHA256 hash of data
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Verify that data matches the expected hash
pub fn verify_hash(data: &[u8], expected_hash: &str) -> Result<()> {
    let actual_hash = compute_hash(data);
    if actual_hash != expected_hash {
        return Err(SurfError::HashMismatch {
            expected: expected_hash.to_string(),
            actual: actual_hash,
        });
    }
    Ok(())
}
