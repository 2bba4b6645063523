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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in a manifest: a content-type and the absolute URL a consumer
/// fetches the corresponding ciphertext from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    #[serde(rename = "contentType")]
    pub content_type: String,
    pub location: String,
}

/// The manifest served on a successful POST to `/{shlId}`.
///
/// The first entry is always the primary document
/// (`application/fhir+json`); the rest are attachments in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub files: Vec<FileEntry>,
}

/// Server-private access-control state for one SHL. Never served to a
/// consumer; mutated only by the access-control engine's `updateMetadata`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metadata {
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    /// Lowercase-hex SHA-256 of the passcode. Never the passcode itself.
    #[serde(rename = "passcode", skip_serializing_if = "Option::is_none", default)]
    pub passcode_hash: Option<String>,

    #[serde(rename = "maxAccesses", skip_serializing_if = "Option::is_none", default)]
    pub max_accesses: Option<u64>,

    #[serde(rename = "accessCount")]
    pub access_count: u64,

    #[serde(rename = "expiresAt", skip_serializing_if = "Option::is_none", default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Metadata {
    pub fn new(
        passcode_hash: Option<String>,
        max_accesses: Option<u64>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Metadata {
            created_at: Utc::now(),
            passcode_hash,
            max_accesses,
            access_count: 0,
            expires_at,
        }
    }
}

/// Delivered to an operator-supplied callback after a successful manifest
/// access. Never persisted by the core itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessEvent {
    #[serde(rename = "shlId")]
    pub shl_id: String,
    #[serde(rename = "accessCount")]
    pub access_count: u64,
    pub timestamp: DateTime<Utc>,
}

/// One attachment supplied to the builder: its content-type and raw bytes.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Options accepted by the SHL builder. Explicit fields
/// rather than an option bag -- every default is stated here rather than
/// scattered across call sites.
#[derive(Debug, Clone, Default)]
pub struct BuilderOptions {
    pub passcode: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_accesses: Option<u64>,
    pub label: Option<String>,
    pub attachments: Vec<Attachment>,
    pub debug: bool,
}

/// The result of a successful build: the one artifact a consumer needs
/// plus bookkeeping a producer may want to display.
#[derive(Debug, Clone)]
pub struct BuiltShl {
    pub token: String,
    pub shl_id: String,
    pub passcode: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// CORS behaviour for the access-control engine.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allow_origin: String,
    pub allow_methods: String,
    pub allow_headers: String,
    pub disabled: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        CorsConfig {
            allow_origin: "*".to_string(),
            allow_methods: "GET, POST, OPTIONS".to_string(),
            allow_headers: "Content-Type, Authorization".to_string(),
            disabled: false,
        }
    }
}
