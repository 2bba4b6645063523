// Licensed to Translating Science PBC under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  Translating Science PBC licenses
// this file to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A filesystem-backed backend. Atomicity on `updateMetadata` comes from a
//! per-shl_id lock table, rather than relying on any filesystem-level
//! locking primitive.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{ShlError, StorageOp};
use crate::model::Metadata;
use crate::storage::{metadata_key, ServerStorage, UpdateOutcome, UpdateResult, WriteOnlyStorage};

/// Explicit configuration for [`LocalStorage`]: the fixed public origin
/// files are served under, and the filesystem root they're written to.
pub struct LocalStorageConfig {
    pub base_url: String,
    pub root: PathBuf,
}

pub struct LocalStorage {
    base_url: String,
    root: PathBuf,
    locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LocalStorage {
    pub fn new(config: LocalStorageConfig) -> Result<Self, ShlError> {
        crate::storage::validate_base_url(&config.base_url)?;
        Ok(LocalStorage {
            base_url: config.base_url,
            root: config.root,
            locks: StdMutex::new(HashMap::new()),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn lock_for(&self, shl_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        locks
            .entry(shl_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await
}

#[async_trait]
impl WriteOnlyStorage for LocalStorage {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn store(&self, key: &str, bytes: Vec<u8>) -> Result<(), ShlError> {
        write_file(&self.path_for(key), &bytes)
            .await
            .map_err(|e| ShlError::storage(StorageOp::Store, e))
    }

    async fn delete(&self, prefix: &str) -> Result<(), ShlError> {
        let dir = self.path_for(prefix);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ShlError::storage(StorageOp::Delete, e)),
        }
    }
}

#[async_trait]
impl ServerStorage for LocalStorage {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, ShlError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ShlError::storage(StorageOp::Read, e)),
        }
    }

    async fn update_metadata(
        &self,
        shl_id: &str,
        updater: &(dyn Fn(&Metadata) -> UpdateOutcome + Send + Sync),
    ) -> Result<UpdateResult, ShlError> {
        let lock = self.lock_for(shl_id);
        let _guard = lock.lock().await;

        let key = metadata_key(shl_id);
        let Some(current_bytes) = self.read(&key).await? else {
            return Ok(UpdateResult::NotFound);
        };
        let current: Metadata = serde_json::from_slice(&current_bytes)
            .map_err(|e| ShlError::storage(StorageOp::Read, e))?;

        match updater(&current) {
            UpdateOutcome::Commit(new_md) => {
                let bytes = serde_json::to_vec(&new_md).map_err(|e| ShlError::storage(StorageOp::Store, e))?;
                self.store(&key, bytes).await?;
                Ok(UpdateResult::Committed(new_md))
            }
            UpdateOutcome::Deny(reason) => Ok(UpdateResult::Denied(reason)),
        }
    }
}
