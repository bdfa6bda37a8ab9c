//! Upload session: bring a remote object up to date with a local file
//!
//! When the object and its signature already exist, only the bytes the
//! search could not match against the stored signature are staged; every
//! other block is committed by reference to content the object already
//! holds. Otherwise the whole file is staged.

use super::fetch_signature;
use crate::config::Config;
use crate::delta::{search_bytes, ByteRange};
use crate::error::Result;
use crate::mmap::LockedMmap;
use crate::signature::{
    build_from_blocks, build_from_bytes, file_etag, signature_object_name, write_signature_to_bytes, SignatureSet,
};
use crate::storage::StorageBackend;
use crate::transfer::{finalize, TransferScheduler, UploadedBlock};
use bytes::Bytes;
use std::path::Path;

/// Result of an upload session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadResult {
    /// Size of the local file
    pub file_size: u64,
    /// Bytes sent to the store (staged blocks, excluding duplicates)
    pub bytes_transferred: u64,
    /// Bytes committed by reference to the existing object
    pub bytes_reused: u64,
    /// Blocks staged in this session
    pub blocks_staged: usize,
    /// Blocks reused from the existing object
    pub blocks_reused: usize,
    /// Chunks skipped because identical content was already staged
    pub duplicates: usize,
    /// Whether the delta path was taken
    pub delta: bool,
}

impl UploadResult {
    /// Percentage of the file that did not have to be sent
    pub fn savings_percent(&self) -> f64 {
        if self.file_size == 0 {
            0.0
        } else {
            self.file_size.saturating_sub(self.bytes_transferred) as f64 / self.file_size as f64 * 100.0
        }
    }

    fn from_blocks(file_size: u64, blocks: &[UploadedBlock], delta: bool) -> Self {
        let mut result = Self {
            file_size,
            delta,
            ..Default::default()
        };
        for block in blocks {
            match (block.is_new, block.is_duplicate) {
                (true, false) => {
                    result.blocks_staged += 1;
                    result.bytes_transferred += block.size;
                }
                (true, true) => result.duplicates += 1,
                (false, _) => {
                    result.blocks_reused += 1;
                    result.bytes_reused += block.size;
                }
            }
        }
        result
    }
}

/// Upload a local file to `container/object`, reusing blocks of the existing object where possible
pub async fn upload(
    local_path: &Path,
    container: &str,
    object: &str,
    store: &StorageBackend,
    config: &Config,
) -> Result<UploadResult> {
    store.ensure_container(container).await?;

    // Step 1: Look for a baseline (object and signature must both exist)
    let sig_object = signature_object_name(object, &config.signature_suffix);
    let baseline = if store.exists(container, object).await? {
        fetch_signature(store, container, &sig_object).await?
    } else {
        tracing::debug!(container, object, "Object does not exist yet");
        None
    };

    // Step 2: Map the local file for the duration of the session
    let mmap = LockedMmap::open(local_path)?;
    let data: &[u8] = &mmap;
    let scheduler = TransferScheduler::new(store.clone(), container, object, config.transfer_options());

    let delta = baseline.is_some();
    let (blocks, signature) = match baseline {
        Some(baseline) => delta_upload(data, &baseline, &scheduler, config).await?,
        None => {
            tracing::info!(container, object, "No baseline signature, performing full upload");
            full_upload(data, &scheduler, config).await?
        }
    };

    // Step 3: Commit the block list, then publish the new signature
    let ids: Vec<String> = blocks.iter().map(|b| b.id.clone()).collect();
    store.commit_block_list(container, object, &ids).await?;

    let sig_bytes = write_signature_to_bytes(&signature)?;
    store.upload_whole(container, &sig_object, Bytes::from(sig_bytes)).await?;

    let result = UploadResult::from_blocks(data.len() as u64, &blocks, delta);
    tracing::info!(
        container,
        object,
        file_size = result.file_size,
        bytes_transferred = result.bytes_transferred,
        bytes_reused = result.bytes_reused,
        blocks_staged = result.blocks_staged,
        blocks_reused = result.blocks_reused,
        duplicates = result.duplicates,
        "Upload complete"
    );

    Ok(result)
}

/// Stage only the unmatched ranges and reference everything else
async fn delta_upload(
    data: &[u8],
    baseline: &SignatureSet,
    scheduler: &TransferScheduler,
    config: &Config,
) -> Result<(Vec<UploadedBlock>, SignatureSet)> {
    let results = search_bytes(data, baseline, &config.search_options())?;

    tracing::info!(
        savings_percent = format!("{:.1}%", results.savings_percent()),
        bytes_reused = results.bytes_reused(),
        bytes_new = results.bytes_to_transfer(),
        ranges = results.to_transfer.len(),
        "Delta search complete"
    );

    let mut blocks = scheduler.upload_ranges(data, &results.to_transfer).await?;
    blocks.extend(results.reusable_signatures().into_iter().map(UploadedBlock::reused));
    let blocks = finalize(blocks);

    let mut signature = build_from_blocks(&blocks);
    signature.source_etag = Some(file_etag(data));

    Ok((blocks, signature))
}

/// Stage every byte of the file
async fn full_upload(
    data: &[u8],
    scheduler: &TransferScheduler,
    config: &Config,
) -> Result<(Vec<UploadedBlock>, SignatureSet)> {
    let whole: Vec<ByteRange> = ByteRange::whole(data.len() as u64).into_iter().collect();
    let blocks = finalize(scheduler.upload_ranges(data, &whole).await?);
    let signature = build_from_bytes(data, config.block_size)?;
    Ok((blocks, signature))
}
