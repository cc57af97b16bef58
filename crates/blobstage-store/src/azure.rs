// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Azure Blob Storage block store
//!
//! Maps the staged-block protocol directly onto Azure's Put Block and
//! Put Block List operations. Blocks carry their MD5 or CRC64 so Azure
//! verifies integrity on receipt, and service errors are classified into
//! [`StoreError`] so the upload core can decide whether to retry.
//!
//! Append and page objects are not wired up for Azure; those calls return
//! [`StoreError::Unsupported`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use blobstage_store::azure::AzureStore;
//!
//! # #[tokio::main]
//! # async fn main() -> blobstage_store::StoreResult<()> {
//! let store = AzureStore::with_connection_string(
//!     "uploads",
//!     "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=...;",
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::{
    validate_key, BlobKind, BlockAck, BlockId, BlockStore, Checksum, ObjectMetadata, StoreError,
    StoreResult,
};
use async_trait::async_trait;
use azure_core::error::ErrorKind;
use azure_storage::prelude::*;
use azure_storage::CloudLocation;
use azure_storage_blobs::prelude::*;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Azure Blob Storage block store
#[derive(Clone)]
pub struct AzureStore {
    account_name: String,
    container_name: String,
    client: Arc<ContainerClient>,
}

impl fmt::Debug for AzureStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureStore")
            .field("account_name", &self.account_name)
            .field("container_name", &self.container_name)
            .finish()
    }
}

fn config_error(msg: impl Into<String>) -> StoreError {
    StoreError::Other(anyhow::anyhow!(msg.into()))
}

fn connection_field<'a>(connection_string: &'a str, name: &str) -> Option<&'a str> {
    connection_string
        .split(';')
        .find_map(|part| part.strip_prefix(name)?.strip_prefix('='))
}

impl AzureStore {
    /// Create a store authenticated with a SAS token
    pub async fn with_sas_token(
        account_name: impl Into<String>,
        container_name: impl Into<String>,
        sas_token: impl Into<String>,
    ) -> StoreResult<Self> {
        let account_name = account_name.into();
        let container_name = container_name.into();
        let sas_token = sas_token.into();

        if account_name.is_empty() {
            return Err(config_error("account_name cannot be empty"));
        }
        if container_name.is_empty() {
            return Err(config_error("container_name cannot be empty"));
        }
        if sas_token.is_empty() {
            return Err(config_error("sas_token cannot be empty"));
        }

        let credentials = StorageCredentials::sas_token(sas_token)
            .map_err(|e| config_error(format!("invalid SAS token: {}", e)))?;
        let client = ClientBuilder::new(account_name.clone(), credentials)
            .container_client(container_name.clone());

        tracing::info!(
            "Created Azure block store with SAS token for {}/{}",
            account_name,
            container_name
        );
        Self::finish(account_name, container_name, client).await
    }

    /// Create a store authenticated with an account key
    pub async fn with_account_key(
        account_name: impl Into<String>,
        container_name: impl Into<String>,
        account_key: impl Into<String>,
    ) -> StoreResult<Self> {
        let account_name = account_name.into();
        let container_name = container_name.into();
        let account_key = account_key.into();

        if account_name.is_empty() {
            return Err(config_error("account_name cannot be empty"));
        }
        if container_name.is_empty() {
            return Err(config_error("container_name cannot be empty"));
        }
        if account_key.is_empty() {
            return Err(config_error("account_key cannot be empty"));
        }

        let credentials = StorageCredentials::access_key(account_name.clone(), account_key);
        let client = ClientBuilder::new(account_name.clone(), credentials)
            .container_client(container_name.clone());

        tracing::info!(
            "Created Azure block store with account key for {}/{}",
            account_name,
            container_name
        );
        Self::finish(account_name, container_name, client).await
    }

    /// Create a store from a connection string
    ///
    /// A `BlobEndpoint=` entry (e.g. Azurite) selects the emulator location.
    pub async fn with_connection_string(
        container_name: impl Into<String>,
        connection_string: impl Into<String>,
    ) -> StoreResult<Self> {
        let container_name = container_name.into();
        let connection_string = connection_string.into();

        if container_name.is_empty() {
            return Err(config_error("container_name cannot be empty"));
        }

        let account_name = connection_field(&connection_string, "AccountName")
            .ok_or_else(|| config_error("invalid connection string: missing AccountName"))?
            .to_string();
        let account_key = connection_field(&connection_string, "AccountKey")
            .ok_or_else(|| config_error("invalid connection string: missing AccountKey"))?
            .to_string();
        let credentials = StorageCredentials::access_key(account_name.clone(), account_key);

        let client = match connection_field(&connection_string, "BlobEndpoint") {
            Some(endpoint) => {
                let url = azure_core::Url::parse(endpoint)
                    .map_err(|e| config_error(format!("invalid BlobEndpoint: {}", e)))?;
                let host = url
                    .host_str()
                    .ok_or_else(|| config_error("invalid BlobEndpoint: missing host"))?;
                let location = CloudLocation::Emulator {
                    address: host.to_string(),
                    port: url.port().unwrap_or(10000),
                };
                tracing::debug!("Using custom blob endpoint: {}", endpoint);
                ClientBuilder::with_location(location, credentials)
                    .container_client(container_name.clone())
            }
            None => ClientBuilder::new(account_name.clone(), credentials)
                .container_client(container_name.clone()),
        };

        tracing::info!(
            "Created Azure block store with connection string for {}/{}",
            account_name,
            container_name
        );
        Self::finish(account_name, container_name, client).await
    }

    async fn finish(
        account_name: String,
        container_name: String,
        client: ContainerClient,
    ) -> StoreResult<Self> {
        let store = AzureStore {
            account_name,
            container_name,
            client: Arc::new(client),
        };
        store.ensure_container_exists().await?;
        Ok(store)
    }

    async fn ensure_container_exists(&self) -> StoreResult<()> {
        match self.client.exists().await {
            Ok(true) => {
                tracing::debug!("Container {} already exists", self.container_name);
                Ok(())
            }
            Ok(false) | Err(_) => match self.client.create().await {
                Ok(_) => {
                    tracing::info!("Created container: {}", self.container_name);
                    Ok(())
                }
                Err(e) if is_error_code(&e, "ContainerAlreadyExists") => Ok(()),
                Err(e) => Err(Self::map_error(e, &self.container_name)),
            },
        }
    }

    /// Classify an Azure SDK error by its status code and service error code
    ///
    /// Text matching is only used for transport errors that carry no status.
    fn map_error(err: azure_core::Error, context: &str) -> StoreError {
        let message = format!("{}: {}", context, err);
        match err.kind() {
            ErrorKind::HttpResponse { status, error_code } => {
                map_http_status(u16::from(*status), error_code.as_deref(), context, message)
            }
            ErrorKind::Io => {
                let lower = message.to_lowercase();
                if lower.contains("timed out") || lower.contains("timeout") {
                    StoreError::timeout(message)
                } else {
                    StoreError::ConnectionReset(message)
                }
            }
            _ => StoreError::Other(anyhow::Error::new(err)),
        }
    }
}

fn map_http_status(
    status: u16,
    error_code: Option<&str>,
    context: &str,
    message: String,
) -> StoreError {
    match (status, error_code) {
        (_, Some("Md5Mismatch" | "Crc64Mismatch")) => {
            StoreError::checksum_mismatch("client checksum", format!("service rejected {}", context))
        }
        (_, Some("AuthenticationFailed")) | (401 | 403, _) => StoreError::permission_denied(message),
        (404, _) => StoreError::not_found(context),
        (412, _) => StoreError::precondition_failed(message),
        (408, _) => StoreError::timeout(message),
        (status, _) => StoreError::http(status, message),
    }
}

fn is_error_code(err: &azure_core::Error, code: &str) -> bool {
    matches!(
        err.kind(),
        ErrorKind::HttpResponse { error_code: Some(found), .. } if found == code
    )
}

fn to_azure_hash(checksum: &Checksum) -> Hash {
    match checksum {
        Checksum::Md5(digest) => Hash::MD5(*digest),
        Checksum::Crc64(value) => Hash::CRC64(*value),
    }
}

#[async_trait]
impl BlockStore for AzureStore {
    async fn put_block(
        &self,
        key: &str,
        block_id: &BlockId,
        data: &[u8],
        checksum: Option<&Checksum>,
    ) -> StoreResult<BlockAck> {
        validate_key(key)?;
        tracing::trace!(key, block = block_id.index(), bytes = data.len(), "Put block");

        let blob_client = self.client.blob_client(key);
        let mut request = blob_client.put_block(block_id.as_str().to_string(), data.to_vec());
        if let Some(checksum) = checksum {
            request = request.hash(to_azure_hash(checksum));
        }
        request
            .await
            .map_err(|e| Self::map_error(e, &format!("{} block {}", key, block_id.index())))?;

        Ok(BlockAck {
            block_id: block_id.clone(),
            size: data.len() as u64,
        })
    }

    async fn commit_block_list(
        &self,
        key: &str,
        block_ids: &[BlockId],
    ) -> StoreResult<ObjectMetadata> {
        validate_key(key)?;
        let block_list = BlockList {
            blocks: block_ids
                .iter()
                .map(|id| BlobBlockType::new_uncommitted(id.as_str().to_string()))
                .collect(),
        };

        self.client
            .blob_client(key)
            .put_block_list(block_list)
            .await
            .map_err(|e| Self::map_error(e, &format!("committing {} blocks to {}", block_ids.len(), key)))?;

        tracing::debug!("Committed {} blocks to {}", block_ids.len(), key);
        let mut meta = self.object_metadata(key).await?;
        meta.block_count = block_ids.len();
        Ok(meta)
    }

    async fn put_object(
        &self,
        key: &str,
        data: &[u8],
        checksum: Option<&Checksum>,
    ) -> StoreResult<ObjectMetadata> {
        validate_key(key)?;
        tracing::debug!("Uploading {} bytes directly to {}", data.len(), key);

        let blob_client = self.client.blob_client(key);
        let mut request = blob_client.put_block_blob(data.to_vec());
        if let Some(checksum) = checksum {
            request = request.hash(to_azure_hash(checksum));
        }
        request.await.map_err(|e| Self::map_error(e, key))?;

        self.object_metadata(key).await
    }

    async fn get_object(&self, key: &str) -> StoreResult<Vec<u8>> {
        validate_key(key)?;
        self.client
            .blob_client(key)
            .get_content()
            .await
            .map_err(|e| Self::map_error(e, key))
    }

    async fn object_metadata(&self, key: &str) -> StoreResult<ObjectMetadata> {
        validate_key(key)?;
        let response = self
            .client
            .blob_client(key)
            .get_properties()
            .await
            .map_err(|e| Self::map_error(e, key))?;

        let properties = response.blob.properties;
        let kind = match properties.blob_type {
            BlobType::AppendBlob => BlobKind::Append,
            BlobType::PageBlob => BlobKind::Page,
            _ => BlobKind::Block,
        };
        let last_modified = DateTime::<Utc>::from_timestamp(properties.last_modified.unix_timestamp(), 0)
            .unwrap_or_else(Utc::now);

        Ok(ObjectMetadata {
            key: key.to_string(),
            size: properties.content_length,
            etag: properties.etag.to_string(),
            kind,
            block_count: 0,
            content_md5: None,
            last_modified,
        })
    }

    async fn delete_object(&self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        match self.client.blob_client(key).delete().await {
            Ok(_) => Ok(()),
            Err(e) => match Self::map_error(e, key) {
                StoreError::NotFound(_) => Ok(()),
                other => Err(other),
            },
        }
    }
}
