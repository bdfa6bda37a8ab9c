//! Block-blob storage backends
//!
//! Objects live in named containers and are assembled from staged blocks:
//! blocks are staged under caller-chosen ids, then a commit names the
//! ordered list of ids (staged or already part of the committed object)
//! that makes up the new content.

pub mod azure;
pub mod local;

use crate::error::Result;
use bytes::Bytes;
use std::path::PathBuf;

pub use azure::AzureBackend;
pub use local::LocalBackend;

/// Storage backend enum for unified access to different stores
#[derive(Clone)]
pub enum StorageBackend {
    Local(LocalBackend),
    Azure(AzureBackend),
}

impl StorageBackend {
    /// Create a local backend rooted at `path`; containers are directories
    pub fn local(path: PathBuf) -> Self {
        StorageBackend::Local(LocalBackend::new(path))
    }

    /// Create an Azure backend, reading credentials from the environment
    pub fn azure(account: Option<String>) -> Result<Self> {
        Ok(StorageBackend::Azure(AzureBackend::new(account)?))
    }

    /// Get the name of this backend (for logging)
    pub fn name(&self) -> &'static str {
        match self {
            StorageBackend::Local(_) => "local",
            StorageBackend::Azure(_) => "azure",
        }
    }

    /// Create the container if it does not exist
    pub async fn ensure_container(&self, container: &str) -> Result<()> {
        match self {
            StorageBackend::Local(b) => b.ensure_container(container).await,
            StorageBackend::Azure(b) => b.ensure_container(container).await,
        }
    }

    /// Check if an object exists
    pub async fn exists(&self, container: &str, object: &str) -> Result<bool> {
        match self {
            StorageBackend::Local(b) => b.exists(container, object).await,
            StorageBackend::Azure(b) => b.exists(container, object).await,
        }
    }

    /// Read a whole object
    pub async fn get(&self, container: &str, object: &str) -> Result<Bytes> {
        match self {
            StorageBackend::Local(b) => b.get(container, object).await,
            StorageBackend::Azure(b) => b.get(container, object).await,
        }
    }

    /// Read bytes `[begin, end]` of an object, or `[begin, EOF)` when `end` is `None`.
    ///
    /// Ranges running past the end of the object are clipped.
    pub async fn get_range(&self, container: &str, object: &str, begin: u64, end: Option<u64>) -> Result<Bytes> {
        match self {
            StorageBackend::Local(b) => b.get_range(container, object, begin, end).await,
            StorageBackend::Azure(b) => b.get_range(container, object, begin, end).await,
        }
    }

    /// Stage one block of an object under `block_id`
    pub async fn put_block(&self, container: &str, object: &str, block_id: &str, data: Bytes) -> Result<()> {
        match self {
            StorageBackend::Local(b) => b.put_block(container, object, block_id, data).await,
            StorageBackend::Azure(b) => b.put_block(container, object, block_id, data).await,
        }
    }

    /// Replace the object's content with the listed blocks, in order
    pub async fn commit_block_list(&self, container: &str, object: &str, block_ids: &[String]) -> Result<()> {
        match self {
            StorageBackend::Local(b) => b.commit_block_list(container, object, block_ids).await,
            StorageBackend::Azure(b) => b.commit_block_list(container, object, block_ids).await,
        }
    }

    /// Write a whole object in one request
    pub async fn upload_whole(&self, container: &str, object: &str, data: Bytes) -> Result<()> {
        match self {
            StorageBackend::Local(b) => b.upload_whole(container, object, data).await,
            StorageBackend::Azure(b) => b.upload_whole(container, object, data).await,
        }
    }

    /// Delete an object
    pub async fn delete(&self, container: &str, object: &str) -> Result<()> {
        match self {
            StorageBackend::Local(b) => b.delete(container, object).await,
            StorageBackend::Azure(b) => b.delete(container, object).await,
        }
    }
}
