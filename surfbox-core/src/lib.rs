//! Surfbox Core - block-sharded file synchronization
//!
//! A directory is kept in step with a remote store using:
//! - fixed-size SHA256 content-addressed blocks
//! - a consistent hash ring placing blocks on block stores
//! - a metadata store arbitrating updates by version number
//! - SQLite for the client's local index

pub mod cluster;
pub mod error;
pub mod hash_ring;
pub mod model;
pub mod operations;
pub mod storage;

pub use cluster::{DynCluster, HttpCluster, InProcessCluster, RemoteCluster, owners_by_hash};
pub use error::{Result, SurfError};
pub use hash_ring::HashRing;
pub use model::{
    Block, DOWNLOAD_TEMP_SUFFIX, FileInfoMap, FileMeta, HashList, MAX_VERSION, TOMBSTONE_HASH,
    UpdateOutcome, is_syncable_name,
};
pub use operations::{
    CheckBlocksOperation, CheckBlocksReport, SyncOperation, SyncReport, SyncSettings,
};
pub use storage::{
    BlockStore, INDEX_FILENAME, LocalIndex, MetaStore, compute_hash, hash_blocks, split_blocks,
    verify_hash,
};
