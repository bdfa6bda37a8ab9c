//! Local filesystem storage backend
//!
//! A container is a directory under the root. Staged blocks are kept in a
//! hidden per-object directory so later commits can reference blocks of the
//! committed object by id, as with a block-blob service. A commit keeps only
//! the blocks it lists; writing a whole object discards all of them.

use crate::error::{Error, Result};
use bytes::Bytes;
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Directory inside each container holding staged blocks
const BLOCKS_DIR: &str = ".blobsync-blocks";

/// Local filesystem storage backend
#[derive(Clone)]
pub struct LocalBackend {
    /// Root path; containers are its subdirectories
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new local backend with the given root path
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn container_path(&self, container: &str) -> PathBuf {
        self.root.join(container)
    }

    fn object_path(&self, container: &str, object: &str) -> PathBuf {
        self.container_path(container).join(object)
    }

    fn block_dir(&self, container: &str, object: &str) -> PathBuf {
        self.container_path(container)
            .join(BLOCKS_DIR)
            .join(hex::encode(object.as_bytes()))
    }

    fn block_path(&self, container: &str, object: &str, block_id: &str) -> PathBuf {
        self.block_dir(container, object)
            .join(hex::encode(block_id.as_bytes()))
    }

    fn not_found(container: &str, object: &str) -> Error {
        Error::NotFound {
            container: container.to_string(),
            object: object.to_string(),
        }
    }

    /// Create the container directory
    pub async fn ensure_container(&self, container: &str) -> Result<()> {
        fs::create_dir_all(self.container_path(container))
            .await
            .map_err(|e| Error::io("creating container directory", e))
    }

    /// Check if an object exists
    pub async fn exists(&self, container: &str, object: &str) -> Result<bool> {
        match fs::metadata(self.object_path(container, object)).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io("reading metadata", e)),
        }
    }

    /// Read an object's contents
    pub async fn get(&self, container: &str, object: &str) -> Result<Bytes> {
        match fs::read(self.object_path(container, object)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Self::not_found(container, object)),
            Err(e) => Err(Error::io("reading object", e)),
        }
    }

    /// Read an inclusive byte range, clipped at end of object
    pub async fn get_range(&self, container: &str, object: &str, begin: u64, end: Option<u64>) -> Result<Bytes> {
        let mut file = match fs::File::open(self.object_path(container, object)).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(Self::not_found(container, object)),
            Err(e) => return Err(Error::io("opening object", e)),
        };

        file.seek(std::io::SeekFrom::Start(begin))
            .await
            .map_err(|e| Error::io("seeking object", e))?;

        let mut buf = Vec::new();
        match end {
            Some(end) => {
                let len = end.saturating_sub(begin) + 1;
                file.take(len)
                    .read_to_end(&mut buf)
                    .await
                    .map_err(|e| Error::io("reading range", e))?;
            }
            None => {
                file.read_to_end(&mut buf)
                    .await
                    .map_err(|e| Error::io("reading range", e))?;
            }
        }

        Ok(Bytes::from(buf))
    }

    /// Stage a block
    pub async fn put_block(&self, container: &str, object: &str, block_id: &str, data: Bytes) -> Result<()> {
        fs::create_dir_all(self.block_dir(container, object))
            .await
            .map_err(|e| Error::io("creating block directory", e))?;

        fs::write(self.block_path(container, object, block_id), &data)
            .await
            .map_err(|e| Error::io("writing block", e))
    }

    /// Assemble the object from the listed blocks and replace it atomically
    pub async fn commit_block_list(&self, container: &str, object: &str, block_ids: &[String]) -> Result<()> {
        let target = self.object_path(container, object);
        let staging = staging_path(&target);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io("creating directories", e))?;
        }

        if let Err(e) = self.assemble(container, object, block_ids, &staging).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e);
        }

        fs::rename(&staging, &target)
            .await
            .map_err(|e| Error::io("renaming staged object", e))?;

        let pruned = self.prune_blocks(container, object, block_ids).await?;
        tracing::trace!(container, object, blocks = block_ids.len(), pruned, "Committed block list");
        Ok(())
    }

    /// Remove staged blocks that are not part of the committed list
    async fn prune_blocks(&self, container: &str, object: &str, block_ids: &[String]) -> Result<usize> {
        let live: HashSet<String> = block_ids.iter().map(|id| hex::encode(id.as_bytes())).collect();

        let mut entries = match fs::read_dir(self.block_dir(container, object)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::io("listing staged blocks", e)),
        };

        let mut pruned = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io("listing staged blocks", e))?
        {
            if live.contains(entry.file_name().to_string_lossy().as_ref()) {
                continue;
            }
            fs::remove_file(entry.path())
                .await
                .map_err(|e| Error::io("removing superseded block", e))?;
            pruned += 1;
        }

        Ok(pruned)
    }

    async fn discard_blocks(&self, container: &str, object: &str) -> Result<()> {
        match fs::remove_dir_all(self.block_dir(container, object)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io("removing staged blocks", e)),
        }
    }

    async fn assemble(&self, container: &str, object: &str, block_ids: &[String], staging: &std::path::Path) -> Result<()> {
        let mut out = fs::File::create(staging)
            .await
            .map_err(|e| Error::io("creating staged object", e))?;

        for block_id in block_ids {
            let data = match fs::read(self.block_path(container, object, block_id)).await {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(Error::storage(format!(
                        "block {} of {}/{} was never staged",
                        block_id, container, object
                    )))
                }
                Err(e) => return Err(Error::io("reading staged block", e)),
            };
            out.write_all(&data)
                .await
                .map_err(|e| Error::io("writing staged object", e))?;
        }

        out.sync_all()
            .await
            .map_err(|e| Error::io("syncing staged object", e))
    }

    /// Write a whole object
    pub async fn upload_whole(&self, container: &str, object: &str, data: Bytes) -> Result<()> {
        let target = self.object_path(container, object);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io("creating directories", e))?;
        }

        let staging = staging_path(&target);
        fs::write(&staging, &data)
            .await
            .map_err(|e| Error::io("writing object", e))?;
        fs::rename(&staging, &target)
            .await
            .map_err(|e| Error::io("renaming object", e))?;

        self.discard_blocks(container, object).await
    }

    /// Delete an object and any blocks staged for it
    pub async fn delete(&self, container: &str, object: &str) -> Result<()> {
        match fs::remove_file(self.object_path(container, object)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(Self::not_found(container, object)),
            Err(e) => return Err(Error::io("removing object", e)),
        }

        self.discard_blocks(container, object).await
    }
}

fn staging_path(target: &std::path::Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".blobsync-tmp");
    target.with_file_name(name)
}
