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

//! The crypto envelope: token encoding/decoding and AEAD
//! encrypt/decrypt of document and attachment blobs.

pub mod envelope;
pub mod token;

use sha2::{Digest, Sha256};

/// Lowercase-hex SHA-256 of a passcode. Shared by the builder (to compute
/// the stored hash) and the engine (to compute the hash of the provided
/// attempt).
pub fn hash_passcode(passcode: &str) -> String {
    hex::encode(Sha256::digest(passcode.as_bytes()))
}
