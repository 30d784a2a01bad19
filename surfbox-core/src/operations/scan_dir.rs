use crate::error::Result;
use crate::model::{FileInfoMap, FileMeta, HashList, is_syncable_name};
use crate::storage::{INDEX_FILENAME, hash_blocks};
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Clone)]
pub struct ScanDirOperation {
    base_dir: PathBuf,
    block_size: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ScanDirOperationResult {
    /// Candidate hash list per file found in the directory.
    pub files: BTreeMap<String, Vec<String>>,
    /// Files that exist but could not be read; their state is unknown.
    pub unreadable: BTreeMap<String, String>,
}

/// What the local diff changed in the index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalChanges {
    pub created: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl LocalChanges {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

impl ScanDirOperation {
    pub fn new(base_dir: impl Into<PathBuf>, block_size: usize) -> Self {
        Self {
            base_dir: base_dir.into(),
            block_size,
        }
    }

    /// Hash every syncable regular file in the base directory.
    pub async fn run(&self) -> Result<ScanDirOperationResult> {
        let mut result = ScanDirOperationResult::default();
        let mut entries = fs::read_dir(&self.base_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!("Skipping non UTF-8 file name {:?}", entry.file_name());
                continue;
            };

            if !is_syncable_name(&name) {
                continue;
            }

            match entry.file_type().await {
                Ok(file_type) if file_type.is_file() => {}
                Ok(_) => continue,
                Err(error) => {
                    tracing::warn!("Failed to stat {}: {}", name, error);
                    result.unreadable.insert(name, error.to_string());
                    continue;
                }
            }

            match self.hash_file(&entry.path()).await {
                Ok(hashes) => {
                    result.files.insert(name, hashes);
                }
                Err(error) => {
                    tracing::warn!("Failed to read {}: {}", name, error);
                    result.unreadable.insert(name, error.to_string());
                }
            }
        }

        Ok(result)
    }

    async fn hash_file(&self, path: &Path) -> Result<Vec<String>> {
        let data = Bytes::from(fs::read(path).await?);
        hash_blocks(&data, self.block_size)
    }
}

impl ScanDirOperationResult {
    /// Fold the scan into the local index.
    ///
    /// New files start at version 1, changed hash lists bump the version, and
    /// indexed files missing from the directory become tombstones one version
    /// up. Unreadable files are left exactly as indexed.
    pub fn apply_to_index(&self, index: &mut FileInfoMap) -> LocalChanges {
        let mut changes = LocalChanges::default();

        for (name, hashes) in &self.files {
            match index.get_mut(name) {
                None => {
                    index.insert(name.clone(), FileMeta::new(name.clone(), 1, hashes.clone()));
                    changes.created.push(name.clone());
                }
                Some(meta) => {
                    if meta.hashes.is_tombstone() || meta.hashes.hashes() != hashes.as_slice() {
                        meta.version = meta.version.saturating_add(1);
                        meta.hashes = HashList::Blocks(hashes.clone());
                        changes.modified.push(name.clone());
                    }
                }
            }
        }

        let present: BTreeSet<&String> = self
            .files
            .keys()
            .chain(self.unreadable.keys())
            .collect();

        let mut names: Vec<&String> = index.keys().collect();
        names.sort();
        let missing: Vec<String> = names
            .into_iter()
            .filter(|name| !present.contains(name))
            .cloned()
            .collect();

        for name in missing {
            if let Some(meta) = index.get_mut(&name)
                && !meta.is_tombstone()
            {
                meta.version = meta.version.saturating_add(1);
                meta.hashes = HashList::Tombstone;
                changes.deleted.push(name);
            }
        }

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute_hash;

    fn scan_of(files: &[(&str, Vec<String>)]) -> ScanDirOperationResult {
        ScanDirOperationResult {
            files: files
                .iter()
                .map(|(name, hashes)| (name.to_string(), hashes.clone()))
                .collect(),
            unreadable: BTreeMap::new(),
        }
    }

    #[test]
    fn test_version_bump_saturates() {
        let mut index = FileInfoMap::new();
        index.insert(
            "max.txt".to_string(),
            FileMeta::new("max.txt", u64::MAX, vec![compute_hash(b"old")]),
        );

        let scan = scan_of(&[("max.txt", vec![compute_hash(b"new")])]);
        let changes = scan.apply_to_index(&mut index);

        assert_eq!(changes.modified, vec!["max.txt".to_string()]);
        assert_eq!(index["max.txt"].version, u64::MAX);
    }

    #[tokio::test]
    async fn test_scan_hashes_files_and_skips_reserved() {
        let temp_dir = tempfile::tempdir().unwrap();
        let base = temp_dir.path();
        std::fs::write(base.join("a.txt"), b"abcdefgh").unwrap();
        std::fs::write(base.join("with,comma.txt"), b"skip").unwrap();
        std::fs::write(base.join(INDEX_FILENAME), b"not a user file").unwrap();
        std::fs::create_dir(base.join("subdir")).unwrap();

        let result = ScanDirOperation::new(base, 4).run().await.unwrap();

        assert_eq!(result.files.len(), 1);
        assert_eq!(
            result.files["a.txt"],
            vec![compute_hash(b"abcd"), compute_hash(b"efgh")]
        );
    }

    #[test]
    fn test_new_file_starts_at_version_one() {
        let mut index = FileInfoMap::new();
        let scan = scan_of(&[("new.txt", vec![compute_hash(b"n")])]);

        let changes = scan.apply_to_index(&mut index);

        assert_eq!(changes.created, vec!["new.txt".to_string()]);
        assert_eq!(index["new.txt"].version, 1);
    }

    #[test]
    fn test_changed_file_bumps_version() {
        let mut index = FileInfoMap::new();
        index.insert(
            "a.txt".to_string(),
            FileMeta::new("a.txt", 3, vec![compute_hash(b"old")]),
        );
        let scan = scan_of(&[("a.txt", vec![compute_hash(b"new")])]);

        let changes = scan.apply_to_index(&mut index);

        assert_eq!(changes.modified, vec!["a.txt".to_string()]);
        assert_eq!(index["a.txt"].version, 4);
        assert_eq!(index["a.txt"].hashes.hashes(), &[compute_hash(b"new")]);
    }

    #[test]
    fn test_unchanged_file_is_untouched() {
        let mut index = FileInfoMap::new();
        let hashes = vec![compute_hash(b"same")];
        index.insert("a.txt".to_string(), FileMeta::new("a.txt", 2, hashes.clone()));

        let changes = scan_of(&[("a.txt", hashes)]).apply_to_index(&mut index);

        assert!(changes.is_empty());
        assert_eq!(index["a.txt"].version, 2);
    }

    #[test]
    fn test_missing_file_becomes_tombstone_once() {
        let mut index = FileInfoMap::new();
        index.insert(
            "gone.txt".to_string(),
            FileMeta::new("gone.txt", 3, vec![compute_hash(b"g")]),
        );

        let changes = scan_of(&[]).apply_to_index(&mut index);
        assert_eq!(changes.deleted, vec!["gone.txt".to_string()]);
        assert!(index["gone.txt"].is_tombstone());
        assert_eq!(index["gone.txt"].version, 4);

        let again = scan_of(&[]).apply_to_index(&mut index);
        assert!(again.is_empty());
        assert_eq!(index["gone.txt"].version, 4);
    }

    #[test]
    fn test_recreated_file_revives_tombstone() {
        let mut index = FileInfoMap::new();
        index.insert("back.txt".to_string(), FileMeta::tombstone("back.txt", 5));

        let changes =
            scan_of(&[("back.txt", vec![compute_hash(b"again")])]).apply_to_index(&mut index);

        assert_eq!(changes.modified, vec!["back.txt".to_string()]);
        assert_eq!(index["back.txt"].version, 6);
        assert!(!index["back.txt"].is_tombstone());
    }

    #[test]
    fn test_unreadable_file_is_not_deleted() {
        let mut index = FileInfoMap::new();
        index.insert(
            "locked.txt".to_string(),
            FileMeta::new("locked.txt", 2, vec![compute_hash(b"l")]),
        );
        let mut scan = scan_of(&[]);
        scan.unreadable
            .insert("locked.txt".to_string(), "permission denied".to_string());

        let changes = scan.apply_to_index(&mut index);

        assert!(changes.is_empty());
        assert_eq!(index["locked.txt"].version, 2);
    }
}
