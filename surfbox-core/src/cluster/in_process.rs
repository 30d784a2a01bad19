use super::RemoteCluster;
use crate::error::{Result, SurfError};
use crate::model::{Block, FileInfoMap, FileMeta, UpdateOutcome};
use crate::storage::{BlockStore, MetaStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// InProcessCluster serves the remote calls from stores living in this
/// process. Block stores are looked up by the same addresses the metadata
/// store hands out.
#[derive(Clone)]
pub struct InProcessCluster {
    meta_store: Arc<MetaStore>,
    block_stores: HashMap<String, Arc<BlockStore>>,
}

impl InProcessCluster {
    /// A metadata store plus one empty block store per address.
    pub fn with_block_stores<I, S>(addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let addrs: Vec<String> = addrs.into_iter().map(Into::into).collect();
        let block_stores = addrs
            .iter()
            .map(|addr| (addr.clone(), Arc::new(BlockStore::new())))
            .collect();

        Self {
            meta_store: Arc::new(MetaStore::new(addrs)),
            block_stores,
        }
    }

    pub fn meta_store(&self) -> &Arc<MetaStore> {
        &self.meta_store
    }

    pub fn block_store(&self, addr: &str) -> Result<&Arc<BlockStore>> {
        self.block_stores
            .get(addr)
            .ok_or_else(|| SurfError::UnknownBlockStore(addr.to_string()))
    }

    pub fn block_stores(&self) -> impl Iterator<Item = (&String, &Arc<BlockStore>)> {
        self.block_stores.iter()
    }
}

#[async_trait]
impl RemoteCluster for InProcessCluster {
    async fn get_block(&self, block_store_addr: &str, hash: &str) -> Result<Block> {
        self.block_store(block_store_addr)?.get_block(hash)
    }

    async fn put_block(&self, block_store_addr: &str, block: &Block) -> Result<bool> {
        Ok(self.block_store(block_store_addr)?.put_block(block.clone()))
    }

    async fn has_blocks(&self, block_store_addr: &str, hashes: &[String]) -> Result<Vec<String>> {
        Ok(self.block_store(block_store_addr)?.has_blocks(hashes))
    }

    async fn get_block_hashes(&self, block_store_addr: &str) -> Result<Vec<String>> {
        Ok(self.block_store(block_store_addr)?.get_block_hashes())
    }

    async fn get_file_info_map(&self) -> Result<FileInfoMap> {
        Ok(self.meta_store.get_file_info_map())
    }

    async fn update_file(&self, meta: &FileMeta) -> Result<UpdateOutcome> {
        self.meta_store.update_file(meta.clone())
    }

    async fn get_block_store_map(
        &self,
        hashes: &[String],
    ) -> Result<HashMap<String, Vec<String>>> {
        Ok(self.meta_store.get_block_store_map(hashes))
    }

    async fn get_block_store_addrs(&self) -> Result<Vec<String>> {
        Ok(self.meta_store.get_block_store_addrs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_blocks_land_on_addressed_store() {
        let cluster = InProcessCluster::with_block_stores(["a:1", "b:2"]);
        let block = Block::new(Bytes::from_static(b"routed"));

        assert!(cluster.put_block("b:2", &block).await.unwrap());

        assert!(cluster.block_store("a:1").unwrap().is_empty());
        let fetched = cluster.get_block("b:2", &block.hash).await.unwrap();
        assert_eq!(fetched.data, block.data);
    }

    #[tokio::test]
    async fn test_unknown_store_address() {
        let cluster = InProcessCluster::with_block_stores(["a:1"]);
        let error = cluster.get_block_hashes("z:9").await.unwrap_err();
        assert!(matches!(error, SurfError::UnknownBlockStore(_)));
    }
}
