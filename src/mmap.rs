//! Read-only memory-mapped file views with file locking
//!
//! Scans hold a shared lock for as long as the view is alive, so cooperating
//! writers cannot truncate the file under an in-progress search pass. The
//! mapping and lock are released when the view is dropped, on every exit path.

use crate::error::{Error, Result};
#[allow(unused_imports)]
use fs2::FileExt; // lock_shared() on File
use memmap2::Mmap;
use std::fs::File;
use std::ops::Deref;
use std::path::Path;

/// A read-only memory-mapped file with an associated shared lock.
///
/// Zero-length files are represented without a mapping.
pub struct LockedMmap {
    mmap: Option<Mmap>,
    /// Kept open to hold the lock
    #[allow(dead_code)]
    file: File,
}

impl LockedMmap {
    /// Open a file and map it under a shared lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or locked, or the
    /// mapping fails.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io("opening file for mmap", e))?;
        Self::from_file(file)
    }

    /// Map an already-opened file under a shared lock.
    pub fn from_file(file: File) -> Result<Self> {
        file.lock_shared()
            .map_err(|e| Error::io("acquiring shared file lock", e))?;

        let len = file
            .metadata()
            .map_err(|e| Error::io("reading metadata for mmap", e))?
            .len();

        let mmap = if len == 0 {
            None
        } else {
            // Safety: the shared lock keeps cooperating processes from
            // truncating the file while it is mapped.
            Some(unsafe { Mmap::map(&file) }.map_err(|e| Error::io("memory mapping file", e))?)
        };

        Ok(Self { mmap, file })
    }

    /// Length of the mapped file
    pub fn len(&self) -> usize {
        self.mmap.as_ref().map_or(0, |m| m.len())
    }

    /// Whether the mapped file is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Inclusive `[begin, end]` view of `data`, clipped to its length
pub fn clipped(data: &[u8], begin: u64, end: u64) -> &[u8] {
    let len = data.len() as u64;
    let start = begin.min(len) as usize;
    let stop = end.saturating_add(1).min(len) as usize;
    if start >= stop {
        &[]
    } else {
        &data[start..stop]
    }
}

impl Deref for LockedMmap {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match &self.mmap {
            Some(m) => m,
            None => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_with(content: &[u8]) -> NamedTempFile {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(content).unwrap();
        temp.flush().unwrap();
        temp
    }

    #[test]
    fn test_locked_mmap_basic() {
        let temp = temp_with(b"hello world");
        let mmap = LockedMmap::open(temp.path()).unwrap();
        assert_eq!(&mmap[..], b"hello world");
        assert_eq!(mmap.len(), 11);
    }

    #[test]
    fn test_locked_mmap_empty_file() {
        let temp = NamedTempFile::new().unwrap();
        let mmap = LockedMmap::open(temp.path()).unwrap();
        assert!(mmap.is_empty());
        assert_eq!(&mmap[..], b"");
    }

    #[test]
    fn test_range_is_inclusive_and_clipped() {
        let temp = temp_with(b"0123456789");
        let mmap = LockedMmap::open(temp.path()).unwrap();

        assert_eq!(clipped(&mmap, 2, 4), b"234");
        assert_eq!(clipped(&mmap, 8, 20), b"89");
        assert_eq!(clipped(&mmap, 12, 20), b"");
    }
}
