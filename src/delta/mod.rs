//! Delta search, byte-range accounting and reconstruction

pub mod ranges;
pub mod reconstruct;
pub mod search;

pub use ranges::{coalesce_ranges, ranges_to_transfer, total_len, verify_tiling};
pub use reconstruct::{reconstruct, FetchedRanges, ReconstructStats};
pub use search::{search, search_bytes, search_for_download, search_for_download_bytes};

use crate::signature::BlockSignature;
use serde::{Deserialize, Serialize};

/// Inclusive byte range `[begin, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteRange {
    /// First byte (inclusive)
    pub begin: u64,
    /// Last byte (inclusive)
    pub end: u64,
}

#[allow(clippy::len_without_is_empty)]
impl ByteRange {
    /// Create a new range; `end` must not precede `begin`
    pub fn new(begin: u64, end: u64) -> Self {
        debug_assert!(end >= begin, "inverted range {}..={}", begin, end);
        Self { begin, end }
    }

    /// The range covering a whole file, or `None` for an empty file
    pub fn whole(file_size: u64) -> Option<Self> {
        (file_size > 0).then(|| Self::new(0, file_size - 1))
    }

    /// Number of bytes in the range
    pub fn len(&self) -> u64 {
        self.end - self.begin + 1
    }

    /// Whether `offset` falls inside the range
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.begin && offset <= self.end
    }
}

/// A baseline block found in the scanned file.
///
/// `region` is in the scanned file's coordinates; `baseline` keeps the
/// signature exactly as it appears in the baseline set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMatch {
    /// Where the content sits in the scanned file
    pub region: ByteRange,
    /// The baseline signature that matched
    pub baseline: BlockSignature,
}

impl BlockMatch {
    /// Record a match of `baseline` at `offset` in the scanned file
    pub fn new(offset: u64, baseline: BlockSignature) -> Self {
        Self {
            region: ByteRange::new(offset, offset + baseline.size as u64 - 1),
            baseline,
        }
    }

    /// Offset of the match in the scanned file
    pub fn offset(&self) -> u64 {
        self.region.begin
    }

    /// Length of the matched block
    pub fn size(&self) -> u64 {
        self.region.len()
    }

    /// The baseline signature relocated into the scanned file's coordinates
    pub fn local_signature(&self) -> BlockSignature {
        self.baseline.relocated(self.region.begin)
    }
}

/// Tunables for the search engine
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Ranges at most this long are only scanned when they are exactly one block
    pub min_range_len: u64,
    /// Block sizes at most this large are only tried against exact-length ranges
    pub min_block_size: usize,
    /// Download-direction scans ignore block sizes at most this large
    pub download_min_block_size: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            min_range_len: 1000,
            min_block_size: 100,
            download_min_block_size: 100,
        }
    }
}

/// Outcome of an upload-direction search
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    /// Length of the scanned file
    pub file_size: u64,
    /// Baseline blocks found in the scanned file (the reuse plan)
    pub matches: Vec<BlockMatch>,
    /// Bytes not covered by any match (the transfer plan)
    pub to_transfer: Vec<ByteRange>,
}

impl SearchResults {
    /// Bytes covered by reusable blocks
    pub fn bytes_reused(&self) -> u64 {
        self.matches.iter().map(BlockMatch::size).sum()
    }

    /// Bytes that must be transferred
    pub fn bytes_to_transfer(&self) -> u64 {
        total_len(&self.to_transfer)
    }

    /// Reused block signatures in the scanned file's coordinates
    pub fn reusable_signatures(&self) -> Vec<BlockSignature> {
        self.matches.iter().map(BlockMatch::local_signature).collect()
    }

    /// Calculate savings percentage
    pub fn savings_percent(&self) -> f64 {
        if self.file_size == 0 {
            0.0
        } else {
            (self.bytes_reused() as f64 / self.file_size as f64) * 100.0
        }
    }

    /// Check if delta sync transfers less than the full file
    pub fn is_beneficial(&self) -> bool {
        self.bytes_to_transfer() < self.file_size
    }
}
