//! Consistent-hash placement of blocks onto block stores.
//!
//! Every block store address gets one position on the ring:
//! `sha256("blockstore" + address)` in hex. A block hash is owned by the first
//! position at or after it (comparing hex strings), wrapping around to the
//! smallest position. The ring is rebuilt from scratch whenever the address
//! list changes; placements from an older ring are not migrated.

use crate::compute_hash;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

const RING_KEY_PREFIX: &str = "blockstore";

#[derive(Debug, Clone, Default)]
pub struct HashRing {
    positions: BTreeMap<String, String>,
}

impl HashRing {
    pub fn new<I, S>(addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let positions = addrs
            .into_iter()
            .map(|addr| {
                let addr = addr.as_ref();
                (ring_position(addr), addr.to_string())
            })
            .collect();

        Self { positions }
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Address of the block store owning `block_hash`, or `None` on an empty ring.
    pub fn responsible(&self, block_hash: &str) -> Option<&str> {
        self.positions
            .range::<str, _>((Bound::Included(block_hash), Bound::Unbounded))
            .next()
            .or_else(|| self.positions.iter().next())
            .map(|(_, addr)| addr.as_str())
    }

    /// Groups `hashes` by owning block store, keeping input order per store.
    pub fn partition(&self, hashes: &[String]) -> HashMap<String, Vec<String>> {
        let mut placement: HashMap<String, Vec<String>> = HashMap::new();
        for hash in hashes {
            if let Some(addr) = self.responsible(hash) {
                placement
                    .entry(addr.to_string())
                    .or_default()
                    .push(hash.clone());
            }
        }
        placement
    }
}

pub fn ring_position(addr: &str) -> String {
    compute_hash(format!("{}{}", RING_KEY_PREFIX, addr).as_bytes())
}
