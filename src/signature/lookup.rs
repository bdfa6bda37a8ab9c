//! Weak-checksum lookup table for one search pass

use super::BlockSignature;
use crate::checksum::{RollingChecksum, StrongHash};
use std::collections::HashMap;

/// Maps a weak checksum to every distinct block sharing it.
///
/// A bucket holds more than one entry only on a true weak collision
/// (same weak checksum, different content). Lookups hand out copies so
/// callers can relocate them freely.
#[derive(Debug, Default)]
pub struct LookupTable {
    buckets: HashMap<RollingChecksum, Vec<BlockSignature>>,
}

impl LookupTable {
    /// Group signatures by weak checksum, dropping content-identical repeats
    pub fn build(signatures: &[BlockSignature]) -> Self {
        let mut buckets: HashMap<RollingChecksum, Vec<BlockSignature>> = HashMap::new();

        for sig in signatures {
            let bucket = buckets.entry(sig.weak).or_default();
            if !bucket.iter().any(|existing| existing.strong == sig.strong) {
                bucket.push(*sig);
            }
        }

        Self { buckets }
    }

    /// Whether any block has this weak checksum
    pub fn contains(&self, weak: &RollingChecksum) -> bool {
        self.buckets.contains_key(weak)
    }

    /// Collision bucket for a weak checksum
    pub fn candidates(&self, weak: &RollingChecksum) -> Option<&[BlockSignature]> {
        self.buckets.get(weak).map(Vec::as_slice)
    }

    /// Find the block matching both checksums
    pub fn find(&self, weak: &RollingChecksum, strong: &StrongHash) -> Option<BlockSignature> {
        self.candidates(weak)
            .and_then(|bucket| lookup_strong(bucket, strong))
    }

    /// Number of distinct weak checksums
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Linear scan of a collision bucket for an exact strong-hash match
pub fn lookup_strong(bucket: &[BlockSignature], strong: &StrongHash) -> Option<BlockSignature> {
    bucket.iter().find(|sig| sig.strong == *strong).copied()
}
