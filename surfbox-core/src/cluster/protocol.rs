//! Wire protocol shared by the HTTP servers and `HttpCluster`.
//!
//! All bodies are JSON. Block payloads carry their bytes base64-encoded, and
//! hash lists use the `["0"]` tombstone encoding of `HashList`.

use crate::error::{Result, SurfError};
use crate::model::{Block, FileInfoMap};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// --- Block store endpoints ---

/// `GET` lists every stored hash; `PUT` stores a block.
pub const ENDPOINT_BLOCKS: &str = "/blocks";
/// `POST` with a hash list, answers the present subset.
pub const ENDPOINT_HAS_BLOCKS: &str = "/blocks/has";

// --- Metadata store endpoints ---

/// `GET` returns the file info map; `POST` proposes a file update.
pub const ENDPOINT_FILES: &str = "/files";
pub const ENDPOINT_BLOCK_STORE_MAP: &str = "/block-store-map";
pub const ENDPOINT_BLOCK_STORE_ADDRS: &str = "/block-store-addrs";

pub const ENDPOINT_HEALTH: &str = "/health";

pub fn block_path(hash: &str) -> String {
    format!("{}/{}", ENDPOINT_BLOCKS, hash)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockPayload {
    pub hash: String,
    /// Block bytes, base64 (standard alphabet, padded).
    pub data: String,
    pub size: u64,
}

impl From<&Block> for BlockPayload {
    fn from(block: &Block) -> Self {
        Self {
            hash: block.hash.clone(),
            data: STANDARD.encode(&block.data),
            size: block.size,
        }
    }
}

impl TryFrom<BlockPayload> for Block {
    type Error = SurfError;

    fn try_from(payload: BlockPayload) -> Result<Self> {
        let data = STANDARD
            .decode(payload.data.as_bytes())
            .map_err(|error| SurfError::InvalidRequest(format!("invalid block data: {}", error)))?;

        Ok(Block {
            hash: payload.hash,
            size: data.len() as u64,
            data: Bytes::from(data),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HashesPayload {
    pub hashes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutBlockResponse {
    pub flag: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileInfoMapResponse {
    pub file_info_map: FileInfoMap,
}

/// Accepted version, or `-1` when the proposal was rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateFileResponse {
    pub version: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockStoreMapResponse {
    pub block_store_map: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockStoreAddrsResponse {
    pub block_store_addrs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
