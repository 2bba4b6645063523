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

//! A hosted-service backend keyed by an API key: `store`/`delete` are
//! HTTPS PUT/DELETE against the service's endpoint, and the public manifest
//! URL it exposes is served by that service, not by this process.
//!
//! This backend implements only [`WriteOnlyStorage`] -- access control for
//! links produced through it is enforced by the hosted service itself, out
//! of this crate's scope.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{ShlError, StorageOp};
use crate::storage::WriteOnlyStorage;

pub struct HostedServiceConfig {
    pub base_url: String,
    pub api_base: String,
    pub api_key: String,
}

pub struct HostedServiceStorage {
    config: HostedServiceConfig,
    client: Client,
}

impl HostedServiceStorage {
    pub fn new(config: HostedServiceConfig) -> Result<Self, ShlError> {
        crate::storage::validate_base_url(&config.base_url)?;
        Ok(HostedServiceStorage {
            config,
            client: Client::new(),
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), key)
    }
}

#[async_trait]
impl WriteOnlyStorage for HostedServiceStorage {
    fn base_url(&self) -> &str {
        &self.config.base_url
    }

    async fn store(&self, key: &str, bytes: Vec<u8>) -> Result<(), ShlError> {
        let response = self
            .client
            .put(self.object_url(key))
            .bearer_auth(&self.config.api_key)
            .body(bytes)
            .send()
            .await
            .map_err(|e| ShlError::storage(StorageOp::Store, e))?;
        if !response.status().is_success() {
            return Err(ShlError::storage(
                StorageOp::Store,
                anyhow::anyhow!("hosted PUT returned {}", response.status()),
            ));
        }
        Ok(())
    }

    async fn delete(&self, prefix: &str) -> Result<(), ShlError> {
        let response = self
            .client
            .delete(self.object_url(prefix))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| ShlError::storage(StorageOp::Delete, e))?;
        // A missing prefix must not fail: treat 404 as success.
        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(ShlError::storage(
                StorageOp::Delete,
                anyhow::anyhow!("hosted DELETE returned {}", response.status()),
            ));
        }
        Ok(())
    }
}
