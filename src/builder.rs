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

//! The SHL builder: turns a document plus options into encrypted
//! blobs, a manifest, metadata, and the shareable token.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

use crate::crypto::{envelope, hash_passcode, token};
use crate::error::ShlError;
use crate::model::{BuilderOptions, BuiltShl, FileEntry, Manifest, Metadata};
use crate::storage::{self, WriteOnlyStorage};

const PRIMARY_CONTENT_TYPE: &str = "application/fhir+json";

fn random_32() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

fn shl_id_string(raw: &[u8; 32]) -> String {
    URL_SAFE_NO_PAD.encode(raw)
}

/// Build and persist one SHL over `document` (an already-serialized JSON
/// document). Returns the token and bookkeeping the producer may want to
/// display; the token itself is the only artifact a consumer needs.
pub async fn build(
    document: &[u8],
    storage: &dyn WriteOnlyStorage,
    options: BuilderOptions,
) -> Result<BuiltShl, ShlError> {
    let content_key = random_32();
    let shl_id = shl_id_string(&random_32());

    if options.debug {
        log::debug!(
            "building shl {shl_id}: {} attachment(s), passcode={}, max_accesses={:?}",
            options.attachments.len(),
            options.passcode.is_some(),
            options.max_accesses
        );
    }

    let content_envelope = envelope::encrypt(document, &content_key, PRIMARY_CONTENT_TYPE)?;
    storage
        .store(&storage::content_key(&shl_id), content_envelope.into_bytes())
        .await?;

    let mut files = vec![FileEntry {
        content_type: PRIMARY_CONTENT_TYPE.to_string(),
        location: format!("{}/{shl_id}/content", storage.base_url()),
    }];

    for (index, attachment) in options.attachments.iter().enumerate() {
        let attachment_envelope =
            envelope::encrypt(&attachment.data, &content_key, &attachment.content_type)?;
        storage
            .store(
                &storage::attachment_key(&shl_id, index as u64),
                attachment_envelope.into_bytes(),
            )
            .await?;
        files.push(FileEntry {
            content_type: attachment.content_type.clone(),
            location: format!("{}/{shl_id}/attachment/{index}", storage.base_url()),
        });
    }

    let manifest = Manifest { files };
    let manifest_json = serde_json::to_vec(&manifest)
        .map_err(|e| ShlError::Validation(format!("manifest serialization failed: {e}")))?;
    storage
        .store(&storage::manifest_key(&shl_id), manifest_json)
        .await?;

    let passcode_hash = options.passcode.as_deref().map(hash_passcode);
    let metadata = Metadata::new(passcode_hash, options.max_accesses, options.expires_at);
    let metadata_json = serde_json::to_vec(&metadata)
        .map_err(|e| ShlError::Validation(format!("metadata serialization failed: {e}")))?;
    storage
        .store(&storage::metadata_key(&shl_id), metadata_json)
        .await?;

    let flag = if options.passcode.is_some() { "LP" } else { "L" };
    let exp = options.expires_at.map(|ts| ts.timestamp());
    let wire_token = token::Token {
        url: format!("{}/{shl_id}", storage.base_url()),
        key: content_key,
        flag: flag.to_string(),
        v: 1,
        exp,
        label: options.label.clone(),
    };
    let encoded_token = token::encode(&wire_token)?;

    if options.debug {
        log::debug!("shl {shl_id} built: {} byte token", encoded_token.len());
    }

    Ok(BuiltShl {
        token: encoded_token,
        shl_id,
        passcode: options.passcode,
        expires_at: options.expires_at,
    })
}
