//! Block signatures and size-partitioned signature sets

pub mod file;
pub mod generate;
pub mod lookup;

pub use file::{read_signature, read_signature_from_bytes, write_signature, write_signature_to_bytes};
pub use generate::{build_from_blocks, build_from_bytes, build_from_reader, build_from_scratch, file_etag};
pub use lookup::{lookup_strong, LookupTable};

use crate::checksum::{content_address, strong_hash, RollingChecksum, StrongHash};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Magic bytes for persisted signature objects
pub const SIGNATURE_MAGIC: &[u8; 6] = b"BSSIG\x01";

/// Current signature format version
pub const SIGNATURE_VERSION: u8 = 1;

/// Name of the sibling object holding the signature of `object`
pub fn signature_object_name(object: &str, suffix: &str) -> String {
    format!("{}{}", object, suffix)
}

/// Signature of one block of a specific file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSignature {
    /// Offset of the block in the file the signature was generated from
    pub offset: u64,

    /// Block length in bytes
    pub size: usize,

    /// Weak rolling checksum
    pub weak: RollingChecksum,

    /// Strong digest
    pub strong: StrongHash,

    /// Sequential block number within the file
    pub index: usize,
}

impl BlockSignature {
    /// Create a new block signature
    pub fn new(offset: u64, size: usize, weak: RollingChecksum, strong: StrongHash, index: usize) -> Self {
        Self {
            offset,
            size,
            weak,
            strong,
            index,
        }
    }

    /// Compute the signature of `block`, which sits at `offset`
    pub fn from_block(block: &[u8], offset: u64, index: usize) -> Self {
        Self::new(
            offset,
            block.len(),
            RollingChecksum::compute(block),
            strong_hash(block),
            index,
        )
    }

    /// One past the last byte of the block
    pub fn end(&self) -> u64 {
        self.offset + self.size as u64
    }

    /// A copy of this signature placed at another offset
    pub fn relocated(&self, offset: u64) -> Self {
        Self { offset, ..*self }
    }

    /// Content address (block id) of this block
    pub fn content_address(&self) -> String {
        content_address(&self.strong)
    }

    /// Whether two signatures describe identical content
    pub fn same_content(&self, other: &BlockSignature) -> bool {
        self.size == other.size && self.weak == other.weak && self.strong == other.strong
    }
}

/// Signatures for a whole file, bucketed by block size
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignatureSet {
    /// Version of the signature format
    pub version: u8,

    /// Total length of the described file
    pub file_size: u64,

    /// BLAKE3-derived tag of the described file, when known
    pub source_etag: Option<String>,

    /// Block size -> signatures of that size
    pub buckets: BTreeMap<usize, Vec<BlockSignature>>,
}

impl SignatureSet {
    /// Create an empty signature set
    pub fn new() -> Self {
        Self {
            version: SIGNATURE_VERSION,
            ..Default::default()
        }
    }

    /// Add a signature to the bucket for its size
    pub fn insert(&mut self, sig: BlockSignature) {
        self.buckets.entry(sig.size).or_default().push(sig);
    }

    /// Block sizes present, largest first
    pub fn sizes_descending(&self) -> Vec<usize> {
        self.buckets.keys().rev().copied().collect()
    }

    /// All signatures of the given size
    pub fn bucket(&self, size: usize) -> &[BlockSignature] {
        self.buckets.get(&size).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Flatten every bucket into one list sorted by ascending offset
    pub fn expand(&self) -> Vec<BlockSignature> {
        let mut all: Vec<BlockSignature> = self.buckets.values().flatten().copied().collect();
        all.sort_by_key(|sig| sig.offset);
        all
    }

    /// Total number of blocks across all sizes
    pub fn block_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Sum of block sizes across all buckets
    pub fn covered_bytes(&self) -> u64 {
        self.buckets
            .iter()
            .map(|(size, sigs)| *size as u64 * sigs.len() as u64)
            .sum()
    }

    /// Whether the set has no blocks
    pub fn is_empty(&self) -> bool {
        self.block_count() == 0
    }

    /// Check if this signature describes different content than `etag`
    pub fn is_stale(&self, etag: &str) -> bool {
        match &self.source_etag {
            Some(own) => own != etag,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(offset: u64, data: &[u8], index: usize) -> BlockSignature {
        BlockSignature::from_block(data, offset, index)
    }

    #[test]
    fn test_sizes_descending() {
        let mut set = SignatureSet::new();
        set.insert(sig(0, b"abcd", 0));
        set.insert(sig(4, b"ef", 1));
        set.insert(sig(6, b"ghijklmn", 2));

        assert_eq!(set.sizes_descending(), vec![8, 4, 2]);
        assert_eq!(set.block_count(), 3);
        assert_eq!(set.covered_bytes(), 14);
    }

    #[test]
    fn test_expand_sorted_by_offset() {
        let mut set = SignatureSet::new();
        set.insert(sig(8, b"zz", 2));
        set.insert(sig(0, b"abcd", 0));
        set.insert(sig(4, b"efgh", 1));

        let offsets: Vec<u64> = set.expand().iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8]);
    }

    #[test]
    fn test_relocated_keeps_content() {
        let original = sig(100, b"payload", 3);
        let moved = original.relocated(7);

        assert_eq!(moved.offset, 7);
        assert_eq!(original.offset, 100);
        assert!(moved.same_content(&original));
        assert_eq!(moved.content_address(), original.content_address());
    }

    #[test]
    fn test_missing_bucket_is_empty() {
        let set = SignatureSet::new();
        assert!(set.bucket(10000).is_empty());
        assert!(set.is_empty());
        assert!(set.is_stale("anything"));
    }

    #[test]
    fn test_signature_object_name() {
        assert_eq!(signature_object_name("data/big.bin", ".sig"), "data/big.bin.sig");
    }
}
