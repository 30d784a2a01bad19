//! Shared data model: blocks, per-file metadata and update outcomes.

use crate::storage::INDEX_FILENAME;
use crate::{Result, SurfError, compute_hash};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reserved hash-list entry marking a deleted file on the wire and on disk.
///
/// Never a valid SHA-256 hex digest, which is always 64 characters long.
pub const TOMBSTONE_HASH: &str = "0";

/// Suffix of the scratch files written next to their final path before a rename.
pub const DOWNLOAD_TEMP_SUFFIX: &str = ".surfbox-partial";

/// Largest version that survives the signed wire encoding.
pub const MAX_VERSION: u64 = i64::MAX as u64;

/// Names the sync treats as user files: a single path component that is
/// not reserved by the client itself.
pub fn is_syncable_name(name: &str) -> bool {
    name != INDEX_FILENAME
        && !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(',')
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
        && !name.contains(std::path::MAIN_SEPARATOR)
        && !name.ends_with(DOWNLOAD_TEMP_SUFFIX)
}

/// Snapshot of every known file, keyed by file name.
pub type FileInfoMap = HashMap<String, FileMeta>;

/// An immutable, content-addressed chunk of file data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub hash: String,
    pub data: Bytes,
    pub size: u64,
}

impl Block {
    pub fn new(data: Bytes) -> Self {
        Self {
            hash: compute_hash(&data),
            size: data.len() as u64,
            data,
        }
    }
}

/// Ordered block hashes of a file, or the deletion marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<String>", try_from = "Vec<String>")]
pub enum HashList {
    Blocks(Vec<String>),
    Tombstone,
}

impl HashList {
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Self::Tombstone)
    }

    /// Block hashes in file order; empty for a tombstone.
    pub fn hashes(&self) -> &[String] {
        match self {
            Self::Blocks(hashes) => hashes,
            Self::Tombstone => &[],
        }
    }

    /// Decodes the boundary representation, recognizing the tombstone sentinel.
    pub fn from_wire(entries: Vec<String>) -> Result<Self> {
        if entries.len() == 1 && entries[0] == TOMBSTONE_HASH {
            return Ok(Self::Tombstone);
        }

        if let Some(sentinel) = entries.iter().find(|entry| *entry == TOMBSTONE_HASH) {
            return Err(SurfError::InvalidRequest(format!(
                "tombstone marker {:?} mixed with block hashes",
                sentinel
            )));
        }

        Ok(Self::Blocks(entries))
    }

    pub fn into_wire(self) -> Vec<String> {
        match self {
            Self::Blocks(hashes) => hashes,
            Self::Tombstone => vec![TOMBSTONE_HASH.to_string()],
        }
    }
}

impl From<HashList> for Vec<String> {
    fn from(list: HashList) -> Self {
        list.into_wire()
    }
}

impl TryFrom<Vec<String>> for HashList {
    type Error = SurfError;

    fn try_from(entries: Vec<String>) -> Result<Self> {
        Self::from_wire(entries)
    }
}

/// Versioned metadata for one file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub filename: String,
    pub version: u64,
    #[serde(rename = "block_hash_list")]
    pub hashes: HashList,
}

impl FileMeta {
    pub fn new(filename: impl Into<String>, version: u64, hashes: Vec<String>) -> Self {
        Self {
            filename: filename.into(),
            version,
            hashes: HashList::Blocks(hashes),
        }
    }

    pub fn tombstone(filename: impl Into<String>, version: u64) -> Self {
        Self {
            filename: filename.into(),
            version,
            hashes: HashList::Tombstone,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.hashes.is_tombstone()
    }

    /// Checks the fields a remote peer controls before they touch storage.
    pub fn validate(&self) -> Result<()> {
        if !is_syncable_name(&self.filename) {
            return Err(SurfError::InvalidRequest(format!(
                "invalid file name {:?}",
                self.filename
            )));
        }
        if self.version > MAX_VERSION {
            return Err(SurfError::InvalidRequest(format!(
                "version {} of {} is out of range",
                self.version, self.filename
            )));
        }
        Ok(())
    }
}

/// Result of an optimistic `update_file` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Accepted(u64),
    /// The proposed version was not exactly one above the stored one.
    Rejected,
}

impl UpdateOutcome {
    /// Wire encoding: the accepted version, or `-1` for a rejection.
    pub fn to_wire(self) -> Result<i64> {
        match self {
            Self::Accepted(version) => i64::try_from(version).map_err(|_| {
                SurfError::InvalidRequest(format!("version {} is out of range", version))
            }),
            Self::Rejected => Ok(-1),
        }
    }

    pub fn from_wire(version: i64) -> Self {
        if version < 0 {
            Self::Rejected
        } else {
            Self::Accepted(version as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tombstone_wire_encoding() {
        let meta = FileMeta::tombstone("notes.txt", 4);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["block_hash_list"], serde_json::json!(["0"]));

        let decoded: FileMeta = serde_json::from_value(json).unwrap();
        assert!(decoded.is_tombstone());
        assert_eq!(decoded.version, 4);
    }

    #[test]
    fn test_empty_list_is_live_file() {
        let decoded = HashList::from_wire(Vec::new()).unwrap();
        assert_eq!(decoded, HashList::Blocks(Vec::new()));
        assert!(!decoded.is_tombstone());
    }

    #[test]
    fn test_sentinel_mixed_with_hashes_is_rejected() {
        let entries = vec![compute_hash(b"a"), TOMBSTONE_HASH.to_string()];
        assert!(HashList::from_wire(entries).is_err());
    }

    #[test]
    fn test_update_outcome_wire() {
        assert_eq!(UpdateOutcome::from_wire(-1), UpdateOutcome::Rejected);
        assert_eq!(UpdateOutcome::from_wire(7), UpdateOutcome::Accepted(7));
        assert_eq!(UpdateOutcome::Rejected.to_wire().unwrap(), -1);
        assert_eq!(
            UpdateOutcome::Accepted(MAX_VERSION).to_wire().unwrap(),
            i64::MAX
        );
        assert!(UpdateOutcome::Accepted(u64::MAX).to_wire().is_err());
    }

    #[test]
    fn test_syncable_names() {
        assert!(is_syncable_name("notes.txt"));
        assert!(is_syncable_name("..hidden"));
        assert!(!is_syncable_name(INDEX_FILENAME));
        assert!(!is_syncable_name("a,b.txt"));
        assert!(!is_syncable_name("notes.txt.surfbox-partial"));
        assert!(!is_syncable_name(""));
        assert!(!is_syncable_name(".."));
        assert!(!is_syncable_name("../escaped.txt"));
        assert!(!is_syncable_name("/etc/passwd"));
        assert!(!is_syncable_name("..\\escaped.txt"));
    }

    #[test]
    fn test_validate_rejects_path_names_and_huge_versions() {
        assert!(FileMeta::new("ok.txt", MAX_VERSION, Vec::new()).validate().is_ok());
        assert!(matches!(
            FileMeta::tombstone("../victim.txt", 1).validate(),
            Err(SurfError::InvalidRequest(_))
        ));
        assert!(matches!(
            FileMeta::new("ok.txt", MAX_VERSION + 1, Vec::new()).validate(),
            Err(SurfError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_block_new_hashes_content() {
        let block = Block::new(Bytes::from_static(b"hello world"));
        assert_eq!(block.size, 11);
        assert_eq!(block.hash, compute_hash(b"hello world"));
    }
}
