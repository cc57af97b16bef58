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

//! Opening the configured block store

use anyhow::{Context, Result};
use blobstage_config::StorageConfig;
use blobstage_store::{BlockStore, LocalStore, MockStore};
use std::sync::Arc;

/// Open the backend named by `config`
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn BlockStore>> {
    match config {
        StorageConfig::Memory => {
            tracing::warn!("Using in-memory store; objects are discarded on exit");
            Ok(Arc::new(MockStore::new()))
        }
        StorageConfig::Local(local) => {
            let store = LocalStore::new(&local.root)
                .await
                .with_context(|| format!("Failed to open local store at {}", local.root))?;
            Ok(Arc::new(store))
        }
        StorageConfig::Azure(azure) => open_azure(azure).await,
    }
}

#[cfg(feature = "azure")]
async fn open_azure(azure: &blobstage_config::AzureStorage) -> Result<Arc<dyn BlockStore>> {
    use blobstage_store::AzureStore;

    let store = if let Some(connection_string) = &azure.connection_string {
        AzureStore::with_connection_string(&azure.container, connection_string).await
    } else if let Some(key) = &azure.access_key {
        AzureStore::with_account_key(&azure.account, &azure.container, key).await
    } else if let Some(sas) = &azure.sas_token {
        AzureStore::with_sas_token(&azure.account, &azure.container, sas).await
    } else {
        anyhow::bail!("Azure storage needs a connection string, access key or SAS token");
    };
    let store = store.with_context(|| {
        format!("Failed to open Azure container {}", azure.container)
    })?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "azure"))]
async fn open_azure(_azure: &blobstage_config::AzureStorage) -> Result<Arc<dyn BlockStore>> {
    anyhow::bail!("Azure storage support not compiled in; rebuild with --features azure")
}
