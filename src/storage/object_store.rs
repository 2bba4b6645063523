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

//! A generic object-store backend keyed by `{bucket, region?, prefix?}`.
//! `updateMetadata` has no filesystem lock to lean on, so it implements a
//! compare-and-swap / retry loop: read a version tag, attempt a conditional
//! write, and retry from scratch on precondition failure.
//!
//! The actual client is left as a trait object (`ObjectClient`) rather than
//! a concrete SDK dependency -- operators plug in whichever bucket SDK they
//! already run (S3, GCS, Azure Blob) behind this seam.

use async_trait::async_trait;

use crate::error::{ShlError, StorageOp};
use crate::model::Metadata;
use crate::storage::{metadata_key, ServerStorage, UpdateOutcome, UpdateResult, WriteOnlyStorage};

/// The version tag an object-store SDK returns alongside a read, used as
/// the precondition for a conditional write.
pub type ObjectVersion = String;

/// The minimal object-store operations this backend needs. Implemented
/// against whatever SDK client the operator configures; kept small so a
/// test double can stand in for it.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, ObjectVersion)>, ShlError>;
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ShlError>;
    /// Conditional write: succeeds only if the object's current version
    /// still matches `expected_version`. Returns `Ok(false)` on a
    /// precondition mismatch (the caller should retry), `Ok(true)` on
    /// success.
    async fn put_if_version(
        &self,
        key: &str,
        bytes: Vec<u8>,
        expected_version: &str,
    ) -> Result<bool, ShlError>;
    async fn delete_prefix(&self, prefix: &str) -> Result<(), ShlError>;
}

const MAX_RETRIES: u32 = 8;

/// Explicit configuration for [`ObjectStoreBackend`]: the fixed public
/// origin files are served under, and an optional key prefix distinguishing
/// this backend's objects within a shared bucket. The object-store client
/// itself is a separate constructor argument -- it's a collaborator, not
/// configuration data.
pub struct ObjectStoreConfig {
    pub base_url: String,
    pub prefix: Option<String>,
}

pub struct ObjectStoreBackend<C: ObjectClient> {
    base_url: String,
    prefix: Option<String>,
    client: C,
}

impl<C: ObjectClient> ObjectStoreBackend<C> {
    pub fn new(config: ObjectStoreConfig, client: C) -> Result<Self, ShlError> {
        crate::storage::validate_base_url(&config.base_url)?;
        Ok(ObjectStoreBackend {
            base_url: config.base_url,
            prefix: config.prefix,
            client,
        })
    }

    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(p) => format!("{p}/{key}"),
            None => key.to_string(),
        }
    }
}

#[async_trait]
impl<C: ObjectClient> WriteOnlyStorage for ObjectStoreBackend<C> {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn store(&self, key: &str, bytes: Vec<u8>) -> Result<(), ShlError> {
        self.client.put(&self.full_key(key), bytes).await
    }

    async fn delete(&self, prefix: &str) -> Result<(), ShlError> {
        self.client.delete_prefix(&self.full_key(prefix)).await
    }
}

#[async_trait]
impl<C: ObjectClient> ServerStorage for ObjectStoreBackend<C> {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, ShlError> {
        Ok(self.client.get(&self.full_key(key)).await?.map(|(bytes, _)| bytes))
    }

    async fn update_metadata(
        &self,
        shl_id: &str,
        updater: &(dyn Fn(&Metadata) -> UpdateOutcome + Send + Sync),
    ) -> Result<UpdateResult, ShlError> {
        let key = self.full_key(&metadata_key(shl_id));

        for _ in 0..MAX_RETRIES {
            let Some((current_bytes, version)) = self.client.get(&key).await? else {
                return Ok(UpdateResult::NotFound);
            };
            let current: Metadata = serde_json::from_slice(&current_bytes)
                .map_err(|e| ShlError::storage(StorageOp::Read, e))?;

            match updater(&current) {
                UpdateOutcome::Commit(new_md) => {
                    let bytes = serde_json::to_vec(&new_md)
                        .map_err(|e| ShlError::storage(StorageOp::Store, e))?;
                    if self.client.put_if_version(&key, bytes, &version).await? {
                        return Ok(UpdateResult::Committed(new_md));
                    }
                    // Precondition failed: another writer committed first.
                    // Retry with fresh state, per the pure-updater contract.
                }
                UpdateOutcome::Deny(reason) => return Ok(UpdateResult::Denied(reason)),
            }
        }

        Err(ShlError::storage(
            StorageOp::Store,
            anyhow::anyhow!("exceeded {MAX_RETRIES} compare-and-swap retries on {shl_id}"),
        ))
    }
}
