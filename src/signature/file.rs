//! Persisted signature format: magic, version, length-prefixed JSON

use super::{SignatureSet, SIGNATURE_MAGIC, SIGNATURE_VERSION};
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const HEADER_LEN: usize = SIGNATURE_MAGIC.len() + 1 + 8;

/// Write a signature to a file
pub fn write_signature(sig: &SignatureSet, path: &Path) -> Result<()> {
    let data = write_signature_to_bytes(sig)?;

    let file = File::create(path).map_err(|e| Error::io("creating signature file", e))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(&data)
        .map_err(|e| Error::io("writing signature", e))?;
    writer.flush().map_err(|e| Error::io("flushing", e))?;

    Ok(())
}

/// Read a signature from a file
pub fn read_signature(path: &Path) -> Result<SignatureSet> {
    let file = File::open(path).map_err(|e| Error::io("opening signature file", e))?;
    let mut reader = BufReader::new(file);

    let mut data = Vec::new();
    reader
        .read_to_end(&mut data)
        .map_err(|e| Error::io("reading signature file", e))?;

    read_signature_from_bytes(&data)
}

/// Read a signature from bytes
pub fn read_signature_from_bytes(data: &[u8]) -> Result<SignatureSet> {
    if data.len() < HEADER_LEN {
        return Err(Error::signature("signature data too short"));
    }

    let (magic, rest) = data.split_at(SIGNATURE_MAGIC.len());
    if magic != SIGNATURE_MAGIC {
        return Err(Error::signature("invalid signature (bad magic)"));
    }

    let version = rest[0];
    if version != SIGNATURE_VERSION {
        return Err(Error::signature(format!(
            "unsupported signature version {} (expected {})",
            version, SIGNATURE_VERSION
        )));
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&rest[1..9]);
    let len = u64::from_le_bytes(len_bytes) as usize;

    let payload = &data[HEADER_LEN..];
    if payload.len() < len {
        return Err(Error::signature("signature data truncated"));
    }

    serde_json::from_slice(&payload[..len])
        .map_err(|e| Error::signature(format!("deserializing signature: {}", e)))
}

/// Write a signature to bytes
pub fn write_signature_to_bytes(sig: &SignatureSet) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(sig)
        .map_err(|e| Error::signature(format!("serializing signature: {}", e)))?;

    let len = json.len() as u64;
    let mut data = Vec::with_capacity(HEADER_LEN + json.len());
    data.extend_from_slice(SIGNATURE_MAGIC);
    data.push(SIGNATURE_VERSION);
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(&json);

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::build_from_bytes;
    use tempfile::NamedTempFile;

    fn sample() -> SignatureSet {
        let data: Vec<u8> = (0..25_000u32).map(|i| (i % 199) as u8).collect();
        build_from_bytes(&data, 10_000).unwrap()
    }

    #[test]
    fn test_roundtrip_file() {
        let sig = sample();

        let file = NamedTempFile::new().unwrap();
        write_signature(&sig, file.path()).unwrap();

        let loaded = read_signature(file.path()).unwrap();
        assert_eq!(loaded, sig);
    }

    #[test]
    fn test_roundtrip_preserves_buckets_and_offsets() {
        let sig = sample();
        let loaded = read_signature_from_bytes(&write_signature_to_bytes(&sig).unwrap()).unwrap();

        assert_eq!(loaded.sizes_descending(), vec![10_000, 5_000]);
        let offsets: Vec<u64> = loaded.expand().iter().map(|b| b.offset).collect();
        assert_eq!(offsets, vec![0, 10_000, 20_000]);
    }

    #[test]
    fn test_invalid_magic() {
        let mut data = write_signature_to_bytes(&sample()).unwrap();
        data[0] = b'X';
        assert!(matches!(
            read_signature_from_bytes(&data),
            Err(Error::Signature { .. })
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut data = write_signature_to_bytes(&sample()).unwrap();
        data[SIGNATURE_MAGIC.len()] = SIGNATURE_VERSION + 1;
        assert!(read_signature_from_bytes(&data).is_err());
    }

    #[test]
    fn test_truncated() {
        let data = write_signature_to_bytes(&sample()).unwrap();
        assert!(read_signature_from_bytes(&data[..data.len() - 1]).is_err());
        assert!(read_signature_from_bytes(&data[..4]).is_err());
    }
}
