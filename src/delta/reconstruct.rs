//! Assemble a new file from local blocks and fetched ranges

use super::{BlockMatch, ByteRange};
use crate::error::{Error, Result};
use crate::mmap::clipped;
use crate::signature::{LookupTable, SignatureSet};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::{ErrorKind, Seek, SeekFrom, Write};

/// Remote ranges fetched for reconstruction, keyed by their first byte
#[derive(Debug, Default)]
pub struct FetchedRanges {
    ranges: BTreeMap<u64, (ByteRange, Bytes)>,
}

impl FetchedRanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fetched range; the payload must hold exactly the range's bytes
    pub fn insert(&mut self, range: ByteRange, data: Bytes) -> Result<()> {
        if data.len() as u64 != range.len() {
            return Err(Error::ShortRead {
                offset: range.begin,
                expected: range.len(),
                actual: data.len() as u64,
            });
        }
        self.ranges.insert(range.begin, (range, data));
        Ok(())
    }

    /// The range beginning exactly at `begin`
    pub fn get(&self, begin: u64) -> Option<(ByteRange, &Bytes)> {
        self.ranges.get(&begin).map(|(range, data)| (*range, data))
    }

    /// Total fetched bytes
    pub fn total_bytes(&self) -> u64 {
        self.ranges.values().map(|(range, _)| range.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Byte counts from one reconstruction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconstructStats {
    /// Bytes copied from the local file
    pub bytes_reused: u64,
    /// Bytes written from fetched ranges
    pub bytes_fetched: u64,
}

impl ReconstructStats {
    pub fn total(&self) -> u64 {
        self.bytes_reused + self.bytes_fetched
    }
}

/// Write the remote file described by `remote` into `out`.
///
/// Blocks are visited in ascending offset order. A block found locally is
/// copied from `local` at its match position; otherwise the fetched range
/// starting at the current cursor is written. Blocks already covered by a
/// wider fetched range are skipped.
pub fn reconstruct<W: Write + Seek>(
    remote: &SignatureSet,
    reusable: &[BlockMatch],
    fetched: &FetchedRanges,
    local: &[u8],
    out: &mut W,
) -> Result<ReconstructStats> {
    let local_blocks: Vec<_> = reusable.iter().map(BlockMatch::local_signature).collect();
    let lut = LookupTable::build(&local_blocks);

    let mut stats = ReconstructStats::default();
    let mut cursor = 0u64;

    for block in remote.expand() {
        if block.end() <= cursor {
            continue;
        }

        if let Some(found) = lut.find(&block.weak, &block.strong) {
            let bytes = clipped(local, found.offset, found.end() - 1);
            if bytes.len() != block.size {
                return Err(Error::ShortRead {
                    offset: found.offset,
                    expected: block.size as u64,
                    actual: bytes.len() as u64,
                });
            }
            write_at(out, block.offset, bytes)?;
            stats.bytes_reused += block.size as u64;
            cursor = block.end();
        } else {
            let (range, data) = fetched.get(cursor).ok_or(Error::MissingRange { offset: cursor })?;
            write_at(out, range.begin, data)?;
            stats.bytes_fetched += range.len();
            cursor = range.end + 1;
        }
    }

    out.flush().map_err(|e| Error::io("flushing reconstructed file", e))?;

    tracing::debug!(
        bytes_reused = stats.bytes_reused,
        bytes_fetched = stats.bytes_fetched,
        "Reconstruction complete"
    );

    Ok(stats)
}

fn write_at<W: Write + Seek>(out: &mut W, offset: u64, bytes: &[u8]) -> Result<()> {
    out.seek(SeekFrom::Start(offset))
        .map_err(|e| Error::io("seeking in reconstructed file", e))?;

    let mut written = 0;
    while written < bytes.len() {
        match out.write(&bytes[written..]) {
            Ok(0) => {
                return Err(Error::ShortWrite {
                    offset,
                    expected: bytes.len() as u64,
                    actual: written as u64,
                })
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::io("writing reconstructed block", e)),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{coalesce_ranges, ranges_to_transfer, search_for_download_bytes, SearchOptions};
    use crate::mmap::clipped;
    use crate::signature::build_from_bytes;
    use std::io::Cursor;

    fn pseudo_random(len: usize, seed: u32) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (state >> 16) as u8
            })
            .collect()
    }

    fn fetch(remote: &[u8], ranges: &[ByteRange]) -> FetchedRanges {
        let mut fetched = FetchedRanges::new();
        for range in ranges {
            let data = Bytes::copy_from_slice(clipped(remote, range.begin, range.end));
            fetched.insert(*range, data).unwrap();
        }
        fetched
    }

    fn rebuild(remote: &[u8], local: &[u8], block_size: usize, coalesce: bool) -> (Vec<u8>, ReconstructStats) {
        let sig = build_from_bytes(remote, block_size).unwrap();
        let matches = search_for_download_bytes(local, &sig, &SearchOptions::default()).unwrap();
        let mut ranges = ranges_to_transfer(&matches, &sig);
        if coalesce {
            ranges = coalesce_ranges(&ranges);
        }
        let fetched = fetch(remote, &ranges);

        let mut out = Cursor::new(Vec::new());
        let stats = reconstruct(&sig, &matches, &fetched, local, &mut out).unwrap();
        (out.into_inner(), stats)
    }

    #[test]
    fn test_rebuild_with_moved_blocks() {
        let remote = pseudo_random(40_000, 1);
        let mut local = remote[30_000..].to_vec();
        local.extend_from_slice(&pseudo_random(777, 2));
        local.extend_from_slice(&remote[..10_000]);

        let (rebuilt, stats) = rebuild(&remote, &local, 10_000, false);
        assert_eq!(rebuilt, remote);
        assert_eq!(stats.bytes_reused, 20_000);
        assert_eq!(stats.bytes_fetched, 20_000);
    }

    #[test]
    fn test_rebuild_with_coalesced_ranges() {
        let remote = pseudo_random(50_000, 3);
        let local = remote[20_000..30_000].to_vec();

        let (rebuilt, stats) = rebuild(&remote, &local, 10_000, true);
        assert_eq!(rebuilt, remote);
        assert_eq!(stats.total(), 50_000);
        assert_eq!(stats.bytes_reused, 10_000);
    }

    #[test]
    fn test_rebuild_from_empty_local() {
        let remote = pseudo_random(25_000, 4);
        let (rebuilt, stats) = rebuild(&remote, &[], 10_000, false);
        assert_eq!(rebuilt, remote);
        assert_eq!(stats.bytes_reused, 0);
    }

    #[test]
    fn test_missing_range_is_an_error() {
        let remote = pseudo_random(20_000, 5);
        let sig = build_from_bytes(&remote, 10_000).unwrap();
        let fetched = fetch(&remote, &[ByteRange::new(0, 9_999)]);

        let mut out = Cursor::new(Vec::new());
        let err = reconstruct(&sig, &[], &fetched, &[], &mut out).unwrap_err();
        assert!(matches!(err, Error::MissingRange { offset: 10_000 }));
    }

    #[test]
    fn test_fetched_length_checked() {
        let mut fetched = FetchedRanges::new();
        let err = fetched
            .insert(ByteRange::new(0, 9), Bytes::from_static(b"short"))
            .unwrap_err();
        assert!(matches!(err, Error::ShortRead { expected: 10, actual: 5, .. }));
    }

    #[test]
    fn test_short_write_reports_progress() {
        struct Full(Cursor<Vec<u8>>, usize);

        impl Write for Full {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                let room = self.1.saturating_sub(self.0.get_ref().len());
                let n = buf.len().min(room);
                self.0.write(&buf[..n])
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        impl Seek for Full {
            fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
                self.0.seek(pos)
            }
        }

        let remote = pseudo_random(200, 6);
        let sig = build_from_bytes(&remote, 200).unwrap();
        let fetched = fetch(&remote, &[ByteRange::new(0, 199)]);

        let mut out = Full(Cursor::new(Vec::new()), 150);
        let err = reconstruct(&sig, &[], &fetched, &[], &mut out).unwrap_err();
        assert!(matches!(
            err,
            Error::ShortWrite {
                offset: 0,
                expected: 200,
                actual: 150
            }
        ));
    }
}
