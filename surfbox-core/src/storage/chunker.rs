use crate::error::{Result, SurfError};
use crate::storage::block_store::compute_hash;
use bytes::Bytes;

/// Split `data` into consecutive blocks of `block_size` bytes.
/// The last block may be shorter; empty input yields no blocks.
pub fn split_blocks(data: &Bytes, block_size: usize) -> Result<Vec<Bytes>> {
    if block_size == 0 {
        return Err(SurfError::Config("block size must be positive".to_string()));
    }

    let mut blocks = Vec::with_capacity(data.len().div_ceil(block_size));
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + block_size).min(data.len());
        blocks.push(data.slice(offset..end));
        offset = end;
    }

    Ok(blocks)
}

/// Ordered hash list of `data` cut into `block_size` blocks.
pub fn hash_blocks(data: &Bytes, block_size: usize) -> Result<Vec<String>> {
    Ok(split_blocks(data, block_size)?
        .iter()
        .map(|block| compute_hash(block))
        .collect())
}
