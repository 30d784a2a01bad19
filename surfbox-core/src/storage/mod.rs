//! Storage modules for Surfbox
//!
//! Provides the in-memory block shard, the metadata authority, the client's
//! persisted local index, and block chunking.

pub mod block_store;
pub mod chunker;
pub mod local_index;
pub mod meta_store;

pub use block_store::{BlockStore, compute_hash, verify_hash};
pub use chunker::{hash_blocks, split_blocks};
pub use local_index::{INDEX_FILENAME, LocalIndex};
pub use meta_store::MetaStore;
