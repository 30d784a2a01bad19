use crate::cluster::DynCluster;
use crate::error::Result;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Walks the remote index and checks that every referenced block sits on
/// the block store the ring assigns it to.
#[derive(Clone)]
pub struct CheckBlocksOperation {
    cluster: DynCluster,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingBlock {
    pub filename: String,
    pub hash: String,
    pub block_store_addr: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckBlocksReport {
    pub files_checked: usize,
    pub blocks_checked: usize,
    pub missing: Vec<MissingBlock>,
    /// Block count per store, as reported by `GetBlockHashes`.
    pub block_counts: BTreeMap<String, usize>,
    /// Stores that could not be queried, with the error.
    pub unreachable: BTreeMap<String, String>,
}

impl CheckBlocksReport {
    pub fn is_healthy(&self) -> bool {
        self.missing.is_empty() && self.unreachable.is_empty()
    }
}

impl CheckBlocksOperation {
    pub fn new(cluster: DynCluster) -> Self {
        Self { cluster }
    }

    pub async fn run(&self) -> Result<CheckBlocksReport> {
        let mut report = CheckBlocksReport::default();
        let file_info_map = self.cluster.get_file_info_map().await?;

        let mut filenames: Vec<&String> = file_info_map.keys().collect();
        filenames.sort();

        for filename in filenames {
            let meta = &file_info_map[filename];
            if meta.is_tombstone() {
                continue;
            }
            report.files_checked += 1;

            let hashes = meta.hashes.hashes();
            if hashes.is_empty() {
                continue;
            }
            report.blocks_checked += hashes.len();

            let block_store_map = self.cluster.get_block_store_map(hashes).await?;
            for (addr, assigned) in &block_store_map {
                if report.unreachable.contains_key(addr) {
                    continue;
                }
                let present: BTreeSet<String> =
                    match self.cluster.has_blocks(addr, assigned).await {
                        Ok(present) => present.into_iter().collect(),
                        Err(error) => {
                            tracing::warn!("Failed to query block store {}: {}", addr, error);
                            report.unreachable.insert(addr.clone(), error.to_string());
                            continue;
                        }
                    };

                for hash in assigned {
                    if !present.contains(hash) {
                        report.missing.push(MissingBlock {
                            filename: filename.clone(),
                            hash: hash.clone(),
                            block_store_addr: addr.clone(),
                        });
                    }
                }
            }
        }

        for addr in self.cluster.get_block_store_addrs().await? {
            match self.cluster.get_block_hashes(&addr).await {
                Ok(hashes) => {
                    report.block_counts.insert(addr, hashes.len());
                }
                Err(error) => {
                    tracing::warn!("Failed to list blocks on {}: {}", addr, error);
                    report.unreachable.entry(addr).or_insert(error.to_string());
                }
            }
        }

        tracing::info!(
            "Checked {} files ({} blocks): {} missing",
            report.files_checked,
            report.blocks_checked,
            report.missing.len()
        );
        Ok(report)
    }
}
