//! Download session: bring a local file up to date with a remote object
//!
//! Blocks of the remote object that already exist anywhere in the local
//! file are copied locally; only the remaining byte ranges are fetched.
//! The result is assembled next to the original and renamed over it.

use super::{fetch_signature, with_suffix};
use crate::config::Config;
use crate::delta::{coalesce_ranges, ranges_to_transfer, reconstruct, search_for_download_bytes, ReconstructStats};
use crate::error::{Error, Result};
use crate::mmap::LockedMmap;
use crate::signature::{build_from_bytes, file_etag, signature_object_name, write_signature, SignatureSet};
use crate::storage::StorageBackend;
use crate::transfer::TransferScheduler;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Result of a download session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadResult {
    /// Size of the downloaded object
    pub file_size: u64,
    /// Bytes fetched from the store
    pub bytes_downloaded: u64,
    /// Bytes copied from the existing local file
    pub bytes_reused: u64,
    /// Number of range requests made
    pub range_requests: usize,
    /// Local file already matched the remote signature
    pub unchanged: bool,
    /// Whether the delta path was taken
    pub delta: bool,
}

impl DownloadResult {
    /// Percentage of the object that did not have to be fetched
    pub fn savings_percent(&self) -> f64 {
        if self.file_size == 0 {
            0.0
        } else {
            self.file_size.saturating_sub(self.bytes_downloaded) as f64 / self.file_size as f64 * 100.0
        }
    }
}

/// Download `container/object` into `local_path`, reusing local blocks where possible
pub async fn download(
    local_path: &Path,
    container: &str,
    object: &str,
    store: &StorageBackend,
    config: &Config,
) -> Result<DownloadResult> {
    if !store.exists(container, object).await? {
        return Err(Error::NotFound {
            container: container.to_string(),
            object: object.to_string(),
        });
    }

    let sig_object = signature_object_name(object, &config.signature_suffix);

    // Step 1: Without a local copy there is nothing to reuse
    if !local_path.is_file() {
        tracing::debug!(path = %local_path.display(), "No local file, performing full download");
        let remote_sig = fetch_signature(store, container, &sig_object).await?;
        return full_download(local_path, container, object, remote_sig, store, config).await;
    }

    // Step 2: Fetch the remote signature
    let remote_sig = match fetch_signature(store, container, &sig_object).await? {
        Some(sig) => sig,
        None => {
            tracing::warn!(container, object, "No remote signature, performing full download");
            return full_download(local_path, container, object, None, store, config).await;
        }
    };

    // Step 3: Skip everything if the local file is already current
    let mmap = LockedMmap::open(local_path)?;
    if !remote_sig.is_stale(&file_etag(&mmap)) && mmap.len() as u64 == remote_sig.file_size {
        tracing::info!(path = %local_path.display(), "Local file is up to date");
        return Ok(DownloadResult {
            file_size: remote_sig.file_size,
            bytes_reused: remote_sig.file_size,
            unchanged: true,
            delta: true,
            ..Default::default()
        });
    }

    // Step 4: Find remote blocks in the local file and work out what is missing
    let matches = search_for_download_bytes(&mmap, &remote_sig, &config.search_options())?;
    let ranges = coalesce_ranges(&ranges_to_transfer(&matches, &remote_sig));

    tracing::info!(
        reusable_blocks = matches.len(),
        ranges = ranges.len(),
        bytes_to_fetch = crate::delta::total_len(&ranges),
        "Download plan ready"
    );

    // Step 5: Fetch the missing ranges
    let scheduler = TransferScheduler::new(store.clone(), container, object, config.transfer_options());
    let fetched = scheduler.fetch_ranges(&ranges).await?;

    // Step 6: Assemble next to the original
    let staging = with_suffix(local_path, &config.staging_suffix);
    let stats = {
        let file = File::create(&staging).map_err(|e| Error::io("creating staging file", e))?;
        let mut writer = BufWriter::new(file);
        let stats = reconstruct(&remote_sig, &matches, &fetched, &mmap, &mut writer)?;
        let file = writer
            .into_inner()
            .map_err(|e| Error::io("flushing staging file", e.into_error()))?;
        file.sync_all().map_err(|e| Error::io("syncing staging file", e))?;
        stats
    };
    drop(mmap);

    // Step 7: A stale signature rebuilds the wrong bytes; never let them replace the original
    if !matches_signature(&staging, &remote_sig)? {
        tracing::warn!(
            container,
            object,
            staging = %staging.display(),
            "Rebuilt file does not match the remote signature, performing full download"
        );
        return full_download(local_path, container, object, None, store, config).await;
    }

    std::fs::rename(&staging, local_path).map_err(|e| Error::io("renaming staging file over target", e))?;

    if config.local_signature {
        write_local_signature(local_path, &remote_sig, config)?;
    }

    let result = summarize(&remote_sig, stats, ranges.len());
    tracing::info!(
        path = %local_path.display(),
        file_size = result.file_size,
        bytes_downloaded = result.bytes_downloaded,
        bytes_reused = result.bytes_reused,
        range_requests = result.range_requests,
        "Download complete"
    );

    Ok(result)
}

fn summarize(remote_sig: &SignatureSet, stats: ReconstructStats, range_requests: usize) -> DownloadResult {
    DownloadResult {
        file_size: remote_sig.file_size,
        bytes_downloaded: stats.bytes_fetched,
        bytes_reused: stats.bytes_reused,
        range_requests,
        unchanged: false,
        delta: true,
    }
}

/// Whether the file at `path` has the size and etag recorded in `sig`
fn matches_signature(path: &Path, sig: &SignatureSet) -> Result<bool> {
    let staged = LockedMmap::open(path)?;
    if staged.len() as u64 != sig.file_size {
        return Ok(false);
    }
    Ok(match &sig.source_etag {
        Some(etag) => *etag == file_etag(&staged),
        None => true,
    })
}

/// Fetch the whole object into the local file
async fn full_download(
    local_path: &Path,
    container: &str,
    object: &str,
    remote_sig: Option<SignatureSet>,
    store: &StorageBackend,
    config: &Config,
) -> Result<DownloadResult> {
    if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::io("creating parent directories", e))?;
    }

    let data = store.get(container, object).await?;

    let staging = with_suffix(local_path, &config.staging_suffix);
    {
        let mut file = File::create(&staging).map_err(|e| Error::io("creating staging file", e))?;
        file.write_all(&data)
            .map_err(|e| Error::io("writing downloaded object", e))?;
        file.sync_all().map_err(|e| Error::io("syncing staging file", e))?;
    }
    std::fs::rename(&staging, local_path).map_err(|e| Error::io("renaming staging file over target", e))?;

    if config.local_signature {
        let sig = match remote_sig {
            Some(sig) => sig,
            None => build_from_bytes(&data, config.block_size)?,
        };
        write_local_signature(local_path, &sig, config)?;
    }

    tracing::info!(
        path = %local_path.display(),
        bytes_downloaded = data.len() as u64,
        "Full download complete"
    );

    Ok(DownloadResult {
        file_size: data.len() as u64,
        bytes_downloaded: data.len() as u64,
        range_requests: 1,
        ..Default::default()
    })
}

fn write_local_signature(local_path: &Path, sig: &SignatureSet, config: &Config) -> Result<()> {
    let sig_path = with_suffix(local_path, &config.signature_suffix);
    write_signature(sig, &sig_path)?;
    tracing::debug!(path = %sig_path.display(), "Wrote local signature");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_result_savings() {
        let result = DownloadResult {
            file_size: 10_000,
            bytes_downloaded: 1_000,
            bytes_reused: 9_000,
            range_requests: 10,
            ..Default::default()
        };

        assert_eq!(result.bytes_downloaded + result.bytes_reused, result.file_size);
        assert!((result.savings_percent() - 90.0).abs() < 0.01);
    }

    #[test]
    fn test_matches_signature_checks_size_and_etag() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("data.bin.new");
        let content = vec![7u8; 1_000];
        let sig = build_from_bytes(&content, 100).unwrap();

        std::fs::write(&path, &content).unwrap();
        assert!(matches_signature(&path, &sig).unwrap());

        let mut flipped = content.clone();
        flipped[500] ^= 0xFF;
        std::fs::write(&path, &flipped).unwrap();
        assert!(!matches_signature(&path, &sig).unwrap());

        std::fs::write(&path, &content[..999]).unwrap();
        assert!(!matches_signature(&path, &sig).unwrap());
    }

    #[test]
    fn test_summarize_counts_fetched_and_reused() {
        let sig = build_from_bytes(&[9u8; 300], 100).unwrap();
        let stats = ReconstructStats {
            bytes_reused: 200,
            bytes_fetched: 100,
        };

        let result = summarize(&sig, stats, 1);
        assert_eq!(result.file_size, 300);
        assert_eq!(result.bytes_downloaded, 100);
        assert!(!result.unchanged);
    }
}
