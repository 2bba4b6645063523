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

//! The storage abstraction: an opaque key/blob store plus an atomic
//! metadata read-modify-write, implemented as two trait tiers so a
//! hosted-service backend that only ever writes can still satisfy the
//! builder without pretending to support reads it cannot serve.

pub mod hosted;
pub mod local;
pub mod memory;
pub mod object_store;

use async_trait::async_trait;

use crate::error::ShlError;
use crate::model::Metadata;

/// The outcome of invoking an `updateMetadata` updater function against the
/// current metadata.
pub enum UpdateOutcome {
    /// Commit this new metadata value.
    Commit(Metadata),
    /// Deny the request; no write occurs. Carries the reason the engine
    /// maps to a status code.
    Deny(DenyReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Expired,
    Exhausted,
    Passcode,
}

/// The result of a call to [`ServerStorage::update_metadata`].
pub enum UpdateResult {
    Committed(Metadata),
    Denied(DenyReason),
    NotFound,
}

/// Storage a producer needs to write an SHL: a fixed public origin plus
/// idempotent store/delete. Satisfied by every backend, including ones
/// (like the hosted-service hand-off) that never read their own writes
/// back.
#[async_trait]
pub trait WriteOnlyStorage: Send + Sync {
    /// Fixed HTTPS origin (no trailing slash) under which this SHL's files
    /// are served.
    fn base_url(&self) -> &str;

    /// Idempotent write; a repeat with the same key replaces content.
    async fn store(&self, key: &str, bytes: Vec<u8>) -> Result<(), ShlError>;

    /// Remove every key that begins with `prefix`. Must not fail for a
    /// missing prefix.
    async fn delete(&self, prefix: &str) -> Result<(), ShlError>;
}

/// Storage the access-control engine needs: write-only storage plus
/// reads and an atomic metadata update.
#[async_trait]
pub trait ServerStorage: WriteOnlyStorage {
    /// Return the blob at `key`, or `None` if not present. Never errors for
    /// a missing key.
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, ShlError>;

    /// Atomic read-modify-write on `{shl_id}/metadata.json`. `updater` is
    /// re-invoked from scratch on contention by backends that retry over
    /// compare-and-swap, so it must be a pure function of the metadata it
    /// is given.
    async fn update_metadata(
        &self,
        shl_id: &str,
        updater: &(dyn Fn(&Metadata) -> UpdateOutcome + Send + Sync),
    ) -> Result<UpdateResult, ShlError>;
}

pub(crate) fn metadata_key(shl_id: &str) -> String {
    format!("{shl_id}/metadata.json")
}

pub(crate) fn manifest_key(shl_id: &str) -> String {
    format!("{shl_id}/manifest.json")
}

pub(crate) fn content_key(shl_id: &str) -> String {
    format!("{shl_id}/content.jwe")
}

pub(crate) fn attachment_key(shl_id: &str, index: u64) -> String {
    format!("{shl_id}/attachment-{index}.jwe")
}

/// Validate that `base_url` is a fixed HTTPS origin with no trailing
/// slash. Every concrete backend constructor runs its configured base URL
/// through this before accepting it.
pub(crate) fn validate_base_url(base_url: &str) -> Result<(), ShlError> {
    if base_url.ends_with('/') {
        return Err(ShlError::Validation(format!(
            "base_url must not have a trailing slash: {base_url}"
        )));
    }
    let parsed = url::Url::parse(base_url)
        .map_err(|e| ShlError::Validation(format!("base_url is not a valid URL: {e}")))?;
    if parsed.scheme() != "https" {
        return Err(ShlError::Validation(format!(
            "base_url must use https: {base_url}"
        )));
    }
    Ok(())
}
