//! Remote calls made by the sync client.
//!
//! `RemoteCluster` is the client's whole view of the service: four calls on
//! a block store (addressed per call) and four on the metadata store. Each
//! call either completes or fails; nothing here retries.

pub mod http;
pub mod in_process;
pub mod protocol;

use crate::Result;
use crate::model::{Block, FileInfoMap, FileMeta, UpdateOutcome};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub use http::HttpCluster;
pub use in_process::InProcessCluster;

#[async_trait]
pub trait RemoteCluster: Send + Sync {
    async fn get_block(&self, block_store_addr: &str, hash: &str) -> Result<Block>;

    async fn put_block(&self, block_store_addr: &str, block: &Block) -> Result<bool>;

    async fn has_blocks(&self, block_store_addr: &str, hashes: &[String]) -> Result<Vec<String>>;

    async fn get_block_hashes(&self, block_store_addr: &str) -> Result<Vec<String>>;

    async fn get_file_info_map(&self) -> Result<FileInfoMap>;

    async fn update_file(&self, meta: &FileMeta) -> Result<UpdateOutcome>;

    async fn get_block_store_map(
        &self,
        hashes: &[String],
    ) -> Result<HashMap<String, Vec<String>>>;

    async fn get_block_store_addrs(&self) -> Result<Vec<String>>;
}

pub type DynCluster = Arc<dyn RemoteCluster>;

/// Inverts a block store map into hash -> owning address.
pub fn owners_by_hash(block_store_map: &HashMap<String, Vec<String>>) -> HashMap<&str, &str> {
    block_store_map
        .iter()
        .flat_map(|(addr, hashes)| {
            hashes
                .iter()
                .map(move |hash| (hash.as_str(), addr.as_str()))
        })
        .collect()
}
