//! Azure Blob Storage backend using the native block-blob API

use crate::error::{Error, Result};

use azure_core::error::ErrorKind;
use azure_core::StatusCode;
use azure_storage::prelude::*;
use azure_storage_blobs::prelude::*;
use bytes::Bytes;
use futures::StreamExt;
use std::env;
use std::sync::Arc;

/// Azure Blob Storage backend
#[derive(Clone)]
pub struct AzureBackend {
    client: Arc<BlobServiceClient>,
    account: String,
}

impl AzureBackend {
    /// Create a new Azure backend.
    ///
    /// The account falls back to `AZURE_STORAGE_ACCOUNT`; the key is always
    /// read from `AZURE_STORAGE_ACCESS_KEY`.
    pub fn new(account: Option<String>) -> Result<Self> {
        let account = match account {
            Some(account) => account,
            None => env::var("AZURE_STORAGE_ACCOUNT")
                .map_err(|_| Error::config("AZURE_STORAGE_ACCOUNT environment variable not set"))?,
        };
        let access_key = env::var("AZURE_STORAGE_ACCESS_KEY")
            .map_err(|_| Error::config("AZURE_STORAGE_ACCESS_KEY environment variable not set"))?;

        let storage_creds = StorageCredentials::access_key(account.clone(), access_key);
        let client = BlobServiceClient::new(account.clone(), storage_creds);

        Ok(Self {
            client: Arc::new(client),
            account,
        })
    }

    /// Storage account name
    pub fn account(&self) -> &str {
        &self.account
    }

    fn blob_client(&self, container: &str, object: &str) -> BlobClient {
        self.client.container_client(container).blob_client(object)
    }

    fn azure_error(context: &str, e: azure_core::Error) -> Error {
        Error::Azure {
            message: format!("{}: {}", context, e),
        }
    }

    /// Create the container if it does not exist
    pub async fn ensure_container(&self, container: &str) -> Result<()> {
        let container_client = self.client.container_client(container);

        let exists = container_client
            .exists()
            .await
            .map_err(|e| Self::azure_error("Failed to check container existence", e))?;
        if exists {
            return Ok(());
        }

        match container_client.create().await {
            Ok(_) => Ok(()),
            // Another client created it first
            Err(e) if status_of(&e) == Some(StatusCode::Conflict) => Ok(()),
            Err(e) => Err(Self::azure_error("Failed to create container", e)),
        }
    }

    /// Check if a blob exists
    pub async fn exists(&self, container: &str, object: &str) -> Result<bool> {
        match self.blob_client(container, object).get_properties().await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(Self::azure_error("Failed to get blob properties", e)),
        }
    }

    /// Get blob content
    pub async fn get(&self, container: &str, object: &str) -> Result<Bytes> {
        match self.blob_client(container, object).get_content().await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if is_not_found(&e) => Err(Error::NotFound {
                container: container.to_string(),
                object: object.to_string(),
            }),
            Err(e) => Err(Self::azure_error("Failed to get blob content", e)),
        }
    }

    /// Get an inclusive range of blob content
    pub async fn get_range(&self, container: &str, object: &str, begin: u64, end: Option<u64>) -> Result<Bytes> {
        let blob_client = self.blob_client(container, object);

        let stop = match end {
            Some(end) => end + 1,
            None => {
                let props = blob_client
                    .get_properties()
                    .await
                    .map_err(|e| Self::azure_error("Failed to get blob properties", e))?;
                props.blob.properties.content_length
            }
        };
        if begin >= stop {
            return Ok(Bytes::new());
        }

        let mut stream = blob_client.get().range(begin..stop).into_stream();
        let mut content = Vec::new();
        while let Some(response) = stream.next().await {
            let response = response.map_err(|e| Self::azure_error("Failed to download range", e))?;
            let mut body = response.data;
            while let Some(chunk) = body.next().await {
                content.extend_from_slice(&chunk.map_err(|e| Self::azure_error("Failed to read range body", e))?);
            }
        }

        Ok(Bytes::from(content))
    }

    /// Stage a block
    pub async fn put_block(&self, container: &str, object: &str, block_id: &str, data: Bytes) -> Result<()> {
        self.blob_client(container, object)
            .put_block(BlockId::new(block_id.to_string()), data)
            .await
            .map_err(|e| Self::azure_error("Failed to put block", e))?;
        Ok(())
    }

    /// Commit a block list, resolving each id against staged then committed blocks
    pub async fn commit_block_list(&self, container: &str, object: &str, block_ids: &[String]) -> Result<()> {
        let block_list = BlockList {
            blocks: block_ids
                .iter()
                .map(|id| BlobBlockType::Latest(BlockId::new(id.clone())))
                .collect(),
        };

        self.blob_client(container, object)
            .put_block_list(block_list)
            .await
            .map_err(|e| Self::azure_error("Failed to commit block list", e))?;

        Ok(())
    }

    /// Upload a whole blob
    pub async fn upload_whole(&self, container: &str, object: &str, data: Bytes) -> Result<()> {
        self.blob_client(container, object)
            .put_block_blob(data)
            .await
            .map_err(|e| Self::azure_error("Failed to upload blob", e))?;
        Ok(())
    }

    /// Delete a blob
    pub async fn delete(&self, container: &str, object: &str) -> Result<()> {
        match self.blob_client(container, object).delete().await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Err(Error::NotFound {
                container: container.to_string(),
                object: object.to_string(),
            }),
            Err(e) => Err(Self::azure_error("Failed to delete blob", e)),
        }
    }
}

fn status_of(e: &azure_core::Error) -> Option<StatusCode> {
    match e.kind() {
        ErrorKind::HttpResponse { status, .. } => Some(*status),
        _ => None,
    }
}

fn is_not_found(e: &azure_core::Error) -> bool {
    status_of(e) == Some(StatusCode::NotFound) || e.to_string().contains("BlobNotFound")
}
