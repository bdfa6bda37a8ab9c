//! Byte-range accounting for the download direction

use super::{BlockMatch, ByteRange};
use crate::checksum::StrongHash;
use crate::signature::SignatureSet;
use std::collections::HashSet;

/// Ranges of the remote file that must be fetched.
///
/// Walks the remote signature in offset order. A block whose content was
/// found locally is skipped; any other block produces a range from the
/// cursor through its last byte. The cursor advances past every block.
pub fn ranges_to_transfer(reusable: &[BlockMatch], remote: &SignatureSet) -> Vec<ByteRange> {
    let available: HashSet<StrongHash> = reusable.iter().map(|m| m.baseline.strong).collect();

    let mut ranges = Vec::new();
    let mut cursor = 0u64;

    for block in remote.expand() {
        let end = block.end();
        if !available.contains(&block.strong) && end > cursor {
            ranges.push(ByteRange::new(cursor, end - 1));
        }
        cursor = cursor.max(end);
    }

    ranges
}

/// Merge touching or overlapping ranges.
///
/// Input order does not matter; the output is sorted by `begin`.
pub fn coalesce_ranges(ranges: &[ByteRange]) -> Vec<ByteRange> {
    let mut sorted = ranges.to_vec();
    sorted.sort();

    let mut merged: Vec<ByteRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        if let Some(last) = merged.last_mut() {
            if range.begin <= last.end.saturating_add(1) {
                last.end = last.end.max(range.end);
                continue;
            }
        }
        merged.push(range);
    }

    merged
}

/// Total bytes in a set of ranges
pub fn total_len(ranges: &[ByteRange]) -> u64 {
    ranges.iter().map(ByteRange::len).sum()
}

/// Check that matches and ranges together cover `[0, file_size)` exactly once
pub fn verify_tiling(file_size: u64, matches: &[BlockMatch], ranges: &[ByteRange]) -> bool {
    let mut pieces: Vec<ByteRange> = matches.iter().map(|m| m.region).chain(ranges.iter().copied()).collect();
    pieces.sort();

    let mut expected = 0u64;
    for piece in pieces {
        if piece.begin != expected {
            return false;
        }
        expected = piece.end + 1;
    }

    expected == file_size
}
