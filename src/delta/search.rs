//! Multi-pass rolling search of a local file against a baseline signature
//!
//! Block sizes are tried largest first. Each pass only scans the ranges
//! left uncovered by the previous one, so the final matches plus the final
//! ranges tile the scanned file exactly once.

use super::{BlockMatch, ByteRange, SearchOptions, SearchResults};
use crate::checksum::{strong_hash, RollingChecksum, StrongHash};
use crate::error::{Error, Result};
use crate::mmap::LockedMmap;
use crate::signature::{LookupTable, SignatureSet};
use std::collections::HashSet;
use std::path::Path;

/// Emit a trace line every this many scanned bytes
const PROGRESS_INTERVAL: u64 = 10 * 1024 * 1024;

/// Search a local file for blocks of `baseline`, producing reuse and transfer plans.
///
/// The file is mapped read-only for the duration of the search.
pub fn search(path: &Path, baseline: &SignatureSet, options: &SearchOptions) -> Result<SearchResults> {
    let mmap = LockedMmap::open(path)?;
    search_bytes(&mmap, baseline, options)
}

/// Search an in-memory buffer; see [`search`]
pub fn search_bytes(data: &[u8], baseline: &SignatureSet, options: &SearchOptions) -> Result<SearchResults> {
    let file_size = data.len() as u64;
    let mut remaining: Vec<ByteRange> = ByteRange::whole(file_size).into_iter().collect();
    let mut matches = Vec::new();

    tracing::debug!(
        file_size,
        sizes = baseline.buckets.len(),
        blocks = baseline.block_count(),
        "Starting delta search"
    );

    for block_size in baseline.sizes_descending() {
        if remaining.is_empty() {
            break;
        }

        let lut = LookupTable::build(baseline.bucket(block_size));
        let (next, found) = search_pass(data, &remaining, &lut, block_size, options)?;

        tracing::debug!(
            block_size,
            ranges_in = remaining.len(),
            ranges_out = next.len(),
            matches = found.len(),
            "Search pass complete"
        );

        matches.extend(found);
        remaining = next;
    }

    let results = SearchResults {
        file_size,
        matches,
        to_transfer: remaining,
    };

    tracing::debug!(
        matches = results.matches.len(),
        bytes_reused = results.bytes_reused(),
        bytes_to_transfer = results.bytes_to_transfer(),
        "Delta search complete"
    );

    Ok(results)
}

/// Whether a range is worth scanning with windows of `block_size`
fn worth_scanning(range_len: u64, block_size: usize, options: &SearchOptions) -> bool {
    (range_len > options.min_range_len && block_size > options.min_block_size)
        || range_len == block_size as u64
}

/// One pass over the uncovered ranges with a single block size
fn search_pass(
    data: &[u8],
    ranges: &[ByteRange],
    lut: &LookupTable,
    block_size: usize,
    options: &SearchOptions,
) -> Result<(Vec<ByteRange>, Vec<BlockMatch>)> {
    let mut next = Vec::with_capacity(ranges.len());
    let mut found = Vec::new();

    for range in ranges {
        let range_len = range.len();
        if !worth_scanning(range_len, block_size, options) || range_len < block_size as u64 {
            next.push(*range);
            continue;
        }
        scan_range(data, *range, lut, block_size, &mut next, &mut found)?;
    }

    Ok((next, found))
}

/// Slide a window across one range, splitting it around confirmed matches.
///
/// The window always advances one byte. Windows starting inside an already
/// claimed block are not eligible, so claims never overlap.
fn scan_range(
    data: &[u8],
    range: ByteRange,
    lut: &LookupTable,
    block_size: usize,
    next: &mut Vec<ByteRange>,
    found: &mut Vec<BlockMatch>,
) -> Result<()> {
    let window = block_size as u64;
    let last_start = range.end + 1 - window;

    let mut offset = range.begin;
    // First byte of the range not yet claimed by a match or emitted as a gap
    let mut unclaimed = range.begin;
    let mut sum = RollingChecksum::compute(window_at(data, offset, block_size)?);
    let mut last_progress = offset;

    loop {
        if offset - last_progress >= PROGRESS_INTERVAL {
            last_progress = offset;
            tracing::trace!(offset, block_size, matches = found.len(), "Search progress");
        }

        if offset >= unclaimed && lut.contains(&sum) {
            let strong = strong_hash(window_at(data, offset, block_size)?);
            if let Some(baseline) = lut.find(&sum, &strong) {
                if unclaimed < offset {
                    next.push(ByteRange::new(unclaimed, offset - 1));
                }
                found.push(BlockMatch::new(offset, baseline));
                unclaimed = offset + window;
            }
        }

        if offset == last_start {
            break;
        }

        let leaving = byte_at(data, offset)?;
        let entering = byte_at(data, offset + window)?;
        sum = sum.roll(window as i64, leaving, entering)?;
        offset += 1;
    }

    if unclaimed <= range.end {
        next.push(ByteRange::new(unclaimed, range.end));
    }

    Ok(())
}

/// Find every location of the remote signature's content in a local file.
///
/// Scans the whole file once per block size (sizes at or below the download
/// gate are skipped) and reports the first local occurrence of each distinct
/// block. No range accounting is produced.
pub fn search_for_download(
    path: &Path,
    remote: &SignatureSet,
    options: &SearchOptions,
) -> Result<Vec<BlockMatch>> {
    let mmap = LockedMmap::open(path)?;
    search_for_download_bytes(&mmap, remote, options)
}

/// Download-direction search over an in-memory buffer; see [`search_for_download`]
pub fn search_for_download_bytes(
    data: &[u8],
    remote: &SignatureSet,
    options: &SearchOptions,
) -> Result<Vec<BlockMatch>> {
    let file_size = data.len() as u64;
    let mut matches = Vec::new();
    let mut seen: HashSet<StrongHash> = HashSet::new();

    for block_size in remote.sizes_descending() {
        if block_size <= options.download_min_block_size || (block_size as u64) > file_size {
            continue;
        }

        let lut = LookupTable::build(remote.bucket(block_size));
        let before = matches.len();
        let whole = ByteRange::new(0, file_size - 1);
        scan_all_windows(data, whole, &lut, block_size, &mut seen, &mut matches)?;

        tracing::debug!(
            block_size,
            matches = matches.len() - before,
            "Download search pass complete"
        );
    }

    Ok(matches)
}

/// Test every window position in `range` without claiming bytes
fn scan_all_windows(
    data: &[u8],
    range: ByteRange,
    lut: &LookupTable,
    block_size: usize,
    seen: &mut HashSet<StrongHash>,
    found: &mut Vec<BlockMatch>,
) -> Result<()> {
    let window = block_size as u64;
    let last_start = range.end + 1 - window;

    let mut offset = range.begin;
    let mut sum = RollingChecksum::compute(window_at(data, offset, block_size)?);

    loop {
        if lut.contains(&sum) {
            let strong = strong_hash(window_at(data, offset, block_size)?);
            if !seen.contains(&strong) {
                if let Some(baseline) = lut.find(&sum, &strong) {
                    seen.insert(strong);
                    found.push(BlockMatch::new(offset, baseline));
                }
            }
        }

        if offset == last_start {
            break;
        }

        sum = sum.roll(window as i64, byte_at(data, offset)?, byte_at(data, offset + window)?)?;
        offset += 1;
    }

    Ok(())
}

fn window_at(data: &[u8], offset: u64, len: usize) -> Result<&[u8]> {
    let start = offset as usize;
    data.get(start..start + len).ok_or_else(|| Error::ShortRead {
        offset,
        expected: len as u64,
        actual: data.len().saturating_sub(start) as u64,
    })
}

fn byte_at(data: &[u8], offset: u64) -> Result<u8> {
    data.get(offset as usize).copied().ok_or(Error::ShortRead {
        offset,
        expected: 1,
        actual: 0,
    })
}
