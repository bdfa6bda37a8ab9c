//! Parallel staging of new blocks and ranged fetches against a store

pub mod scheduler;

pub use scheduler::TransferScheduler;

use crate::delta::ByteRange;
use crate::retry::RetryConfig;
use crate::signature::BlockSignature;

/// One block of an assembled object, staged in this session or reused
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedBlock {
    /// Content address used as the store's block id
    pub id: String,
    /// Offset in the local file
    pub offset: u64,
    /// Block length
    pub size: u64,
    /// Signature in the local file's coordinates
    pub signature: BlockSignature,
    /// Staged during this session rather than reused from the baseline
    pub is_new: bool,
    /// Same content was already staged by another chunk of this session
    pub is_duplicate: bool,
}

impl UploadedBlock {
    /// A block whose bytes were staged in this session
    pub fn staged(signature: BlockSignature, is_duplicate: bool) -> Self {
        Self {
            id: signature.content_address(),
            offset: signature.offset,
            size: signature.size as u64,
            signature,
            is_new: true,
            is_duplicate,
        }
    }

    /// A block whose content the committed object already holds
    pub fn reused(signature: BlockSignature) -> Self {
        Self {
            id: signature.content_address(),
            offset: signature.offset,
            size: signature.size as u64,
            signature,
            is_new: false,
            is_duplicate: false,
        }
    }
}

/// Tunables for a transfer session
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Largest chunk staged as one block
    pub chunk_size: usize,
    /// Concurrent workers; 0 or 1 runs sequentially
    pub workers: usize,
    /// Bound on queued chunks awaiting a worker
    pub queue_depth: usize,
    /// Retry policy for individual store requests
    pub retry: RetryConfig,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: 10_000,
            workers: num_cpus::get(),
            queue_depth: 100,
            retry: RetryConfig::default(),
        }
    }
}

/// Split a range into consecutive chunks of at most `chunk_size` bytes
pub fn partition(range: ByteRange, chunk_size: usize) -> Vec<ByteRange> {
    let step = chunk_size.max(1) as u64;
    let mut chunks = Vec::with_capacity((range.len() / step + 1) as usize);

    let mut begin = range.begin;
    while begin <= range.end {
        let end = range.end.min(begin + step - 1);
        chunks.push(ByteRange::new(begin, end));
        begin = end + 1;
    }

    chunks
}

/// Order blocks by offset and renumber their signatures to match
pub fn finalize(mut blocks: Vec<UploadedBlock>) -> Vec<UploadedBlock> {
    blocks.sort_by_key(|b| b.offset);
    for (index, block) in blocks.iter_mut().enumerate() {
        block.signature.index = index;
    }
    blocks
}
