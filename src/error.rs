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

use thiserror::Error;

/// The storage sub-operation that failed, used to classify `ShlError::Storage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    Store,
    Delete,
    Read,
    Import,
}

impl std::fmt::Display for StorageOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StorageOp::Store => "store",
            StorageOp::Delete => "delete",
            StorageOp::Read => "read",
            StorageOp::Import => "import",
        };
        f.write_str(s)
    }
}

/// Error taxonomy for the producer and consumer APIs.
///
/// The access-control engine never lets one of these escape to a caller;
/// it converts every expected failure into an HTTP-shaped response and only
/// ever logs storage errors, per the propagation policy.
#[derive(Debug, Error)]
pub enum ShlError {
    /// Malformed input: missing field, bad token prefix, wrong key length.
    #[error("validation error: {0}")]
    Validation(String),

    /// A storage backend operation failed.
    #[error("storage {op} failed: {source}")]
    Storage {
        op: StorageOp,
        #[source]
        source: anyhow::Error,
    },

    /// AEAD authentication or compression failure during encryption.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// AEAD authentication, Base64, or inflate failure during decryption.
    ///
    /// Deliberately does not distinguish "wrong key" from "tampered
    /// ciphertext" -- this is desired, not an omission.
    #[error("decryption failed")]
    DecryptFailed,

    /// The token's structure or one of its fields was malformed.
    #[error("invalid token: {0}")]
    InvalidToken(String),
}

impl ShlError {
    pub fn storage(op: StorageOp, source: impl Into<anyhow::Error>) -> Self {
        ShlError::Storage {
            op,
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ShlError>;
