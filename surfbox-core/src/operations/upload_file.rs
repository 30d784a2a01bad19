use crate::cluster::{DynCluster, owners_by_hash};
use crate::error::{Result, SurfError};
use crate::model::{Block, FileMeta, UpdateOutcome};
use crate::storage::split_blocks;
use bytes::Bytes;
use std::path::PathBuf;

#[derive(Clone)]
pub struct UploadFileOperation {
    cluster: DynCluster,
    base_dir: PathBuf,
    block_size: usize,
}

#[derive(Debug, Clone)]
pub struct UploadFileOperationRequest {
    /// Proposed metadata, already one version above the last synced one.
    pub meta: FileMeta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadFileOperationOutcome {
    Committed { version: u64, blocks_stored: usize },
    /// The metadata store holds a different version; nothing was committed.
    Rejected,
}

impl UploadFileOperation {
    pub fn new(cluster: DynCluster, base_dir: impl Into<PathBuf>, block_size: usize) -> Self {
        Self {
            cluster,
            base_dir: base_dir.into(),
            block_size,
        }
    }

    pub async fn run(
        &self,
        request: UploadFileOperationRequest,
    ) -> Result<UploadFileOperationOutcome> {
        let UploadFileOperationRequest { meta } = request;

        let blocks_stored = if meta.is_tombstone() {
            0
        } else {
            self.store_blocks(&meta).await?
        };

        match self.cluster.update_file(&meta).await? {
            UpdateOutcome::Accepted(version) => {
                tracing::info!(
                    "Committed {} at version {} ({} blocks)",
                    meta.filename,
                    version,
                    blocks_stored
                );
                Ok(UploadFileOperationOutcome::Committed {
                    version,
                    blocks_stored,
                })
            }
            UpdateOutcome::Rejected => {
                tracing::info!(
                    "Metadata store rejected {} at version {}; will reconcile on a later pass",
                    meta.filename,
                    meta.version
                );
                Ok(UploadFileOperationOutcome::Rejected)
            }
        }
    }

    /// Put every block of the file on the block store that owns it.
    async fn store_blocks(&self, meta: &FileMeta) -> Result<usize> {
        let expected = meta.hashes.hashes();
        let path = self.base_dir.join(&meta.filename);
        let data = Bytes::from(tokio::fs::read(&path).await?);
        let blocks = split_blocks(&data, self.block_size)?;

        if blocks.len() != expected.len() {
            return Err(SurfError::InvalidRequest(format!(
                "{} changed since it was scanned ({} blocks, expected {})",
                meta.filename,
                blocks.len(),
                expected.len()
            )));
        }

        if blocks.is_empty() {
            return Ok(0);
        }

        let block_store_map = self.cluster.get_block_store_map(expected).await?;
        if block_store_map.is_empty() {
            return Err(SurfError::NoBlockStores);
        }
        let owners = owners_by_hash(&block_store_map);

        for (data, expected_hash) in blocks.into_iter().zip(expected) {
            let block = Block::new(data);
            if &block.hash != expected_hash {
                return Err(SurfError::HashMismatch {
                    expected: expected_hash.clone(),
                    actual: block.hash,
                });
            }

            let addr = owners
                .get(block.hash.as_str())
                .ok_or_else(|| SurfError::UnassignedBlock {
                    hash: block.hash.clone(),
                })?;

            if !self.cluster.put_block(addr, &block).await? {
                return Err(SurfError::Internal(format!(
                    "block store {} refused block {}",
                    addr, block.hash
                )));
            }
        }

        Ok(expected.len())
    }
}
