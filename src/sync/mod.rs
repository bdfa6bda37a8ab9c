//! Upload and download sessions, plus local signature tooling

pub mod compare;
pub mod download;
pub mod upload;

pub use compare::{compare_files, CompareReport, SizeSummary};
pub use download::{download, DownloadResult};
pub use upload::{upload, UploadResult};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::signature::{build_from_scratch, read_signature_from_bytes, write_signature, SignatureSet};
use crate::storage::StorageBackend;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Append `suffix` to the file name of `path` (`data.bin` + `.new` = `data.bin.new`)
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Download and parse a signature object.
///
/// A missing or unreadable signature is reported as `None` so callers can
/// fall back to a full transfer.
pub async fn fetch_signature(
    store: &StorageBackend,
    container: &str,
    sig_object: &str,
) -> Result<Option<SignatureSet>> {
    if !store.exists(container, sig_object).await? {
        tracing::debug!(container, object = sig_object, "No signature found");
        return Ok(None);
    }

    let data = match store.get(container, sig_object).await {
        Ok(data) => data,
        Err(Error::NotFound { .. }) => return Ok(None),
        Err(e) => return Err(e),
    };

    match read_signature_from_bytes(&data) {
        Ok(sig) => {
            tracing::debug!(
                container,
                object = sig_object,
                blocks = sig.block_count(),
                "Found signature"
            );
            Ok(Some(sig))
        }
        Err(e) => {
            tracing::warn!(container, object = sig_object, error = %e, "Ignoring unreadable signature");
            Ok(None)
        }
    }
}

/// Generate a signature for a local file and write it to `output`
/// (default `<file><signature_suffix>`)
pub fn sign_file(path: &Path, output: Option<&Path>, config: &Config) -> Result<(PathBuf, SignatureSet)> {
    let sig = build_from_scratch(path, config.block_size)?;
    let out = match output {
        Some(out) => out.to_path_buf(),
        None => with_suffix(path, &config.signature_suffix),
    };
    write_signature(&sig, &out)?;

    tracing::info!(
        path = %path.display(),
        output = %out.display(),
        blocks = sig.block_count(),
        "Signature written"
    );

    Ok((out, sig))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::read_signature;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_with_suffix() {
        assert_eq!(with_suffix(Path::new("dir/data.bin"), ".new"), PathBuf::from("dir/data.bin.new"));
        assert_eq!(with_suffix(Path::new("archive"), ".sig"), PathBuf::from("archive.sig"));
    }

    #[test]
    fn test_sign_file_default_output() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data.bin");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&vec![3u8; 25_000]).unwrap();
        drop(file);

        let (out, sig) = sign_file(&path, None, &Config::default()).unwrap();
        assert_eq!(out, tmp.path().join("data.bin.sig"));
        assert_eq!(read_signature(&out).unwrap(), sig);
        assert_eq!(sig.bucket(10_000).len(), 2);
        assert_eq!(sig.bucket(5_000).len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_signature_missing_or_corrupt() {
        let tmp = TempDir::new().unwrap();
        let store = StorageBackend::local(tmp.path().to_path_buf());

        assert!(fetch_signature(&store, "box", "obj.sig").await.unwrap().is_none());

        store
            .upload_whole("box", "obj.sig", bytes::Bytes::from_static(b"not a signature"))
            .await
            .unwrap();
        assert!(fetch_signature(&store, "box", "obj.sig").await.unwrap().is_none());
    }
}
