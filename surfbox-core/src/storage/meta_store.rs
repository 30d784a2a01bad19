use crate::error::Result;
use crate::hash_ring::HashRing;
use crate::model::{FileInfoMap, FileMeta, UpdateOutcome};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashMap;

/// MetaStore is the single authority for file metadata.
///
/// Updates use an optimistic version check: a known file only accepts a
/// proposal whose version is exactly one above the stored version. The
/// check-and-set runs under the entry lock of that file name, so two
/// proposals for the same version can never both be accepted.
pub struct MetaStore {
    files: DashMap<String, FileMeta>,
    block_store_addrs: Vec<String>,
    ring: HashRing,
}

impl MetaStore {
    pub fn new(block_store_addrs: Vec<String>) -> Self {
        let ring = HashRing::new(&block_store_addrs);
        Self {
            files: DashMap::new(),
            block_store_addrs,
            ring,
        }
    }

    /// Point-in-time copy of every file's metadata.
    pub fn get_file_info_map(&self) -> FileInfoMap {
        self.files
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn get_file(&self, filename: &str) -> Option<FileMeta> {
        self.files.get(filename).map(|entry| entry.value().clone())
    }

    /// Fails with `InvalidRequest` for a name or version no client could
    /// have produced; version conflicts are a `Rejected` outcome instead.
    pub fn update_file(&self, proposed: FileMeta) -> Result<UpdateOutcome> {
        proposed.validate()?;

        let outcome = match self.files.entry(proposed.filename.clone()) {
            Entry::Vacant(vacant) => {
                let version = proposed.version;
                tracing::info!(
                    "Created {} at version {}",
                    proposed.filename,
                    version
                );
                vacant.insert(proposed);
                UpdateOutcome::Accepted(version)
            }
            Entry::Occupied(mut occupied) => {
                let current = occupied.get().version;
                if current.checked_add(1) != Some(proposed.version) {
                    tracing::info!(
                        "Rejected {} at version {} (stored version {})",
                        proposed.filename,
                        proposed.version,
                        current
                    );
                    return Ok(UpdateOutcome::Rejected);
                }

                let version = proposed.version;
                tracing::info!(
                    "Updated {} to version {}{}",
                    proposed.filename,
                    version,
                    if proposed.is_tombstone() { " (deleted)" } else { "" }
                );
                occupied.insert(proposed);
                UpdateOutcome::Accepted(version)
            }
        };
        Ok(outcome)
    }

    /// Partitions `hashes` by the block store responsible for each one.
    pub fn get_block_store_map(&self, hashes: &[String]) -> HashMap<String, Vec<String>> {
        self.ring.partition(hashes)
    }

    pub fn get_block_store_addrs(&self) -> Vec<String> {
        self.block_store_addrs.clone()
    }
}
