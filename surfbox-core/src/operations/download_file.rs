use crate::cluster::{DynCluster, owners_by_hash};
use crate::error::{Result, SurfError};
use crate::model::{DOWNLOAD_TEMP_SUFFIX, FileMeta, is_syncable_name};
use crate::verify_hash;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Clone)]
pub struct DownloadFileOperation {
    cluster: DynCluster,
    base_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DownloadFileOperationRequest {
    pub remote: FileMeta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadFileOperationOutcome {
    Restored { size_bytes: u64 },
    /// Remote tombstone applied; `existed` tells whether a local file was removed.
    Deleted { existed: bool },
}

impl DownloadFileOperation {
    pub fn new(cluster: DynCluster, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            cluster,
            base_dir: base_dir.into(),
        }
    }

    pub async fn run(
        &self,
        request: DownloadFileOperationRequest,
    ) -> Result<DownloadFileOperationOutcome> {
        let DownloadFileOperationRequest { remote } = request;
        if !is_syncable_name(&remote.filename) {
            return Err(SurfError::InvalidRequest(format!(
                "refusing to write remote file {:?} outside {}",
                remote.filename,
                self.base_dir.display()
            )));
        }
        let path = self.base_dir.join(&remote.filename);

        if remote.is_tombstone() {
            let existed = match fs::remove_file(&path).await {
                Ok(()) => true,
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => false,
                Err(error) => return Err(error.into()),
            };
            if existed {
                tracing::info!(
                    "Removed {} (deleted remotely at version {})",
                    remote.filename,
                    remote.version
                );
            }
            return Ok(DownloadFileOperationOutcome::Deleted { existed });
        }

        let body = self.fetch_body(&remote).await?;
        let size_bytes = body.len() as u64;

        // Write beside the target, then rename over it.
        let temp_path = self
            .base_dir
            .join(format!("{}{}", remote.filename, DOWNLOAD_TEMP_SUFFIX));
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(error) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(error.into());
        }

        tracing::info!(
            "Restored {} at version {} ({} bytes)",
            remote.filename,
            remote.version,
            size_bytes
        );
        Ok(DownloadFileOperationOutcome::Restored { size_bytes })
    }

    /// Fetch and concatenate the blocks of `remote` in hash-list order.
    async fn fetch_body(&self, remote: &FileMeta) -> Result<Vec<u8>> {
        let hashes = remote.hashes.hashes();
        if hashes.is_empty() {
            return Ok(Vec::new());
        }

        let block_store_map = self.cluster.get_block_store_map(hashes).await?;
        let owners = owners_by_hash(&block_store_map);

        let mut body = Vec::new();
        for hash in hashes {
            let addr = owners
                .get(hash.as_str())
                .ok_or_else(|| SurfError::UnassignedBlock { hash: hash.clone() })?;

            let block = self.cluster.get_block(addr, hash).await?;
            verify_hash(&block.data, hash)?;
            body.extend_from_slice(&block.data);
        }

        Ok(body)
    }
}
