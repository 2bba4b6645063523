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

//! An in-process backend over a locked `HashMap`. Useful to embedders that
//! don't need durability across restarts, and the backend the builder and
//! engine integration tests exercise.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{ShlError, StorageOp};
use crate::model::Metadata;
use crate::storage::{metadata_key, ServerStorage, UpdateOutcome, UpdateResult, WriteOnlyStorage};

pub struct MemoryStorage {
    base_url: String,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ShlError> {
        let base_url = base_url.into();
        crate::storage::validate_base_url(&base_url)?;
        Ok(MemoryStorage {
            base_url,
            blobs: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl WriteOnlyStorage for MemoryStorage {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn store(&self, key: &str, bytes: Vec<u8>) -> Result<(), ShlError> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| ShlError::storage(StorageOp::Store, anyhow::anyhow!("lock poisoned")))?;
        blobs.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, prefix: &str) -> Result<(), ShlError> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| ShlError::storage(StorageOp::Delete, anyhow::anyhow!("lock poisoned")))?;
        blobs.retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}

#[async_trait]
impl ServerStorage for MemoryStorage {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, ShlError> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| ShlError::storage(StorageOp::Read, anyhow::anyhow!("lock poisoned")))?;
        Ok(blobs.get(key).cloned())
    }

    async fn update_metadata(
        &self,
        shl_id: &str,
        updater: &(dyn Fn(&Metadata) -> UpdateOutcome + Send + Sync),
    ) -> Result<UpdateResult, ShlError> {
        // A single process-wide mutex already serializes every write, so
        // holding it across read-modify-write gives atomicity per shl_id
        // (and, more strongly, across all shl_ids) without a retry loop.
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| ShlError::storage(StorageOp::Store, anyhow::anyhow!("lock poisoned")))?;

        let key = metadata_key(shl_id);
        let Some(current_bytes) = blobs.get(&key) else {
            return Ok(UpdateResult::NotFound);
        };
        let current: Metadata = serde_json::from_slice(current_bytes)
            .map_err(|e| ShlError::storage(StorageOp::Read, anyhow::anyhow!(e)))?;

        match updater(&current) {
            UpdateOutcome::Commit(new_md) => {
                let bytes = serde_json::to_vec(&new_md)
                    .map_err(|e| ShlError::storage(StorageOp::Store, anyhow::anyhow!(e)))?;
                blobs.insert(key, bytes);
                Ok(UpdateResult::Committed(new_md))
            }
            UpdateOutcome::Deny(reason) => Ok(UpdateResult::Denied(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Metadata;

    #[tokio::test]
    async fn store_then_read_round_trips() {
        let storage = MemoryStorage::new("https://shl.example.org").unwrap();
        storage.store("a/b", b"hi".to_vec()).await.unwrap();
        let got = storage.read("a/b").await.unwrap();
        assert_eq!(got, Some(b"hi".to_vec()));
    }

    #[tokio::test]
    async fn read_missing_key_returns_none() {
        let storage = MemoryStorage::new("https://shl.example.org").unwrap();
        assert_eq!(storage.read("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_removes_every_key_with_prefix() {
        let storage = MemoryStorage::new("https://shl.example.org").unwrap();
        storage.store("id/content.jwe", vec![1]).await.unwrap();
        storage.store("id/manifest.json", vec![2]).await.unwrap();
        storage.store("other/content.jwe", vec![3]).await.unwrap();
        storage.delete("id/").await.unwrap();
        assert_eq!(storage.read("id/content.jwe").await.unwrap(), None);
        assert_eq!(storage.read("id/manifest.json").await.unwrap(), None);
        assert!(storage.read("other/content.jwe").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_of_missing_prefix_does_not_error() {
        let storage = MemoryStorage::new("https://shl.example.org").unwrap();
        assert!(storage.delete("nope/").await.is_ok());
    }

    #[tokio::test]
    async fn update_metadata_not_found_when_absent() {
        let storage = MemoryStorage::new("https://shl.example.org").unwrap();
        let result = storage
            .update_metadata("missing-id", &|md| UpdateOutcome::Commit(md.clone()))
            .await
            .unwrap();
        assert!(matches!(result, UpdateResult::NotFound));
    }

    #[tokio::test]
    async fn update_metadata_commits_and_persists() {
        let storage = MemoryStorage::new("https://shl.example.org").unwrap();
        let md = Metadata::new(None, None, None);
        storage
            .store(&metadata_key("id"), serde_json::to_vec(&md).unwrap())
            .await
            .unwrap();

        let result = storage
            .update_metadata("id", &|md| {
                let mut next = md.clone();
                next.access_count += 1;
                UpdateOutcome::Commit(next)
            })
            .await
            .unwrap();

        match result {
            UpdateResult::Committed(new_md) => assert_eq!(new_md.access_count, 1),
            _ => panic!("expected commit"),
        }

        let stored: Metadata =
            serde_json::from_slice(&storage.read(&metadata_key("id")).await.unwrap().unwrap()).unwrap();
        assert_eq!(stored.access_count, 1);
    }
}
