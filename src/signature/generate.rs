//! Signature generation from files, byte slices and uploaded block lists

use super::{BlockSignature, SignatureSet};
use crate::error::{Error, Result};
use crate::mmap::LockedMmap;
use crate::transfer::UploadedBlock;
use rayon::prelude::*;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Files above this size are memory mapped and hashed in parallel
const MMAP_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Tag identifying a file's full contents (first 16 bytes of its BLAKE3 hash)
pub fn file_etag(data: &[u8]) -> String {
    hex::encode(&blake3::hash(data).as_bytes()[..16])
}

/// Build a signature by partitioning a file into `block_size` blocks.
///
/// Every block is `block_size` long except possibly the last one, which
/// lands in its own size bucket.
pub fn build_from_scratch(path: &Path, block_size: usize) -> Result<SignatureSet> {
    check_block_size(block_size)?;

    let file = File::open(path).map_err(|e| Error::io("opening file", e))?;
    let file_size = file
        .metadata()
        .map_err(|e| Error::io("reading metadata", e))?
        .len();

    if file_size > MMAP_THRESHOLD {
        let mmap = LockedMmap::from_file(file)?;
        build_from_bytes(&mmap, block_size)
    } else {
        build_from_reader(file, block_size)
    }
}

/// Build a signature from any reader, reading until end of file
pub fn build_from_reader<R: Read>(mut reader: R, block_size: usize) -> Result<SignatureSet> {
    check_block_size(block_size)?;

    let mut sig = SignatureSet::new();
    let mut buffer = vec![0u8; block_size];
    let mut offset = 0u64;
    let mut index = 0usize;
    let mut file_hasher = blake3::Hasher::new();

    loop {
        let bytes_read = fill_block(&mut reader, &mut buffer)?;
        if bytes_read == 0 {
            break;
        }

        let block = &buffer[..bytes_read];
        file_hasher.update(block);
        sig.insert(BlockSignature::from_block(block, offset, index));

        offset += bytes_read as u64;
        index += 1;

        if bytes_read < block_size {
            break;
        }
    }

    sig.file_size = offset;
    sig.source_etag = Some(hex::encode(&file_hasher.finalize().as_bytes()[..16]));

    tracing::debug!(
        file_size = sig.file_size,
        blocks = sig.block_count(),
        "Generated signature"
    );

    Ok(sig)
}

/// Build a signature from an in-memory (or mapped) buffer, hashing blocks in parallel
pub fn build_from_bytes(data: &[u8], block_size: usize) -> Result<SignatureSet> {
    check_block_size(block_size)?;

    let blocks: Vec<BlockSignature> = data
        .par_chunks(block_size)
        .enumerate()
        .map(|(i, chunk)| BlockSignature::from_block(chunk, (i * block_size) as u64, i))
        .collect();

    let mut sig = SignatureSet::new();
    for block in blocks {
        sig.insert(block);
    }
    sig.file_size = data.len() as u64;
    sig.source_etag = Some(file_etag(data));

    Ok(sig)
}

/// Rebuild a signature from the final block list of a transfer session.
///
/// Offsets are taken from the blocks' embedded signatures, which are in
/// the coordinate system of the file that was just assembled.
pub fn build_from_blocks(blocks: &[UploadedBlock]) -> SignatureSet {
    let mut sig = SignatureSet::new();
    for block in blocks {
        sig.insert(block.signature);
    }
    sig.file_size = blocks.iter().map(|b| b.size).sum();
    sig
}

fn check_block_size(block_size: usize) -> Result<()> {
    if block_size == 0 {
        return Err(Error::config("block size must be greater than zero"));
    }
    Ok(())
}

/// Read until `buffer` is full or the reader is exhausted
fn fill_block<R: Read>(reader: &mut R, buffer: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::io("reading file", e)),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Reader that hands out at most `step` bytes per call
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_default_block_size_buckets() {
        let data: Vec<u8> = (0..25_000u32).map(|i| (i % 253) as u8).collect();
        let sig = build_from_bytes(&data, 10_000).unwrap();

        assert_eq!(sig.bucket(10_000).len(), 2);
        assert_eq!(sig.bucket(5_000).len(), 1);
        assert_eq!(sig.sizes_descending(), vec![10_000, 5_000]);
        assert_eq!(sig.file_size, 25_000);
    }

    #[test]
    fn test_scratch_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"test content here").unwrap();

        let sig = build_from_scratch(file.path(), 8).unwrap();
        assert_eq!(sig.file_size, 17);
        assert_eq!(sig.block_count(), 3);
        assert_eq!(sig.bucket(8).len(), 2);
        assert_eq!(sig.bucket(1).len(), 1);
        assert_eq!(sig.bucket(1)[0].offset, 16);
    }

    #[test]
    fn test_partial_reads_do_not_truncate_blocks() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 256) as u8).collect();
        let trickle = Trickle {
            data: &data,
            step: 33,
        };

        let sig = build_from_reader(trickle, 100).unwrap();
        assert_eq!(sig.bucket(100).len(), 10);
        assert_eq!(sig, build_from_bytes(&data, 100).unwrap());
    }

    #[test]
    fn test_reader_and_bytes_agree() {
        let data: Vec<u8> = (0..12_345u32).map(|i| (i % 97) as u8).collect();
        let from_reader = build_from_reader(&data[..], 1000).unwrap();
        let from_bytes = build_from_bytes(&data, 1000).unwrap();

        assert_eq!(from_reader, from_bytes);
    }

    #[test]
    fn test_sequential_block_indices() {
        let data = vec![9u8; 55];
        let sig = build_from_bytes(&data, 10).unwrap();
        let indices: Vec<usize> = sig.expand().iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let sig = build_from_scratch(file.path(), 10_000).unwrap();
        assert_eq!(sig.file_size, 0);
        assert!(sig.is_empty());
    }

    #[test]
    fn test_zero_block_size_rejected() {
        assert!(build_from_bytes(b"abc", 0).is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = build_from_scratch(Path::new("/nonexistent/blobsync/file"), 100);
        assert!(matches!(result, Err(Error::Io { .. })));
    }

    #[test]
    fn test_build_from_blocks_groups_by_size() {
        let data = b"0123456789abcdefghijXYZ";
        let blocks: Vec<UploadedBlock> = [(0usize, 10usize), (10, 10), (20, 3)]
            .iter()
            .map(|&(start, len)| {
                let sig = BlockSignature::from_block(&data[start..start + len], start as u64, 0);
                UploadedBlock::reused(sig)
            })
            .collect();

        let sig = build_from_blocks(&blocks);
        assert_eq!(sig.bucket(10).len(), 2);
        assert_eq!(sig.bucket(3).len(), 1);
        assert_eq!(sig.file_size, 23);

        let scratch = build_from_bytes(data, 10).unwrap();
        let offsets = |s: &SignatureSet| s.expand().iter().map(|b| b.offset).collect::<Vec<_>>();
        assert_eq!(offsets(&sig), offsets(&scratch));
    }
}
