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

//! The decoder: the consumer-side half of the crypto envelope. Parses
//! a token back into a manifest URL and content key, and decrypts ciphertext
//! back into a document or attachment blob. Thin wrappers over
//! [`crate::crypto`]; errors surface directly rather than being translated
//! or swallowed.

use crate::crypto::envelope::{self, Decrypted};
use crate::crypto::token::{self, Token};
use crate::error::ShlError;

/// Inverse of the builder's token assembly: recover the manifest URL,
/// content key, and the rest of the token's fields.
pub fn decode(token: &str) -> Result<Token, ShlError> {
    token::decode(token)
}

/// Inverse of the builder's encrypt step: recover the plaintext and
/// content-type from an envelope, given the content key extracted by
/// [`decode`].
pub fn decrypt(envelope_str: &str, key: &[u8; 32]) -> Result<Decrypted, ShlError> {
    envelope::decrypt(envelope_str, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::envelope as envelope_mod;

    #[test]
    fn decode_then_decrypt_round_trips_through_the_public_api() {
        let key = [9u8; 32];
        let wire_token = Token {
            url: "https://shl.example.org/abc".to_string(),
            key,
            flag: "L".to_string(),
            v: 1,
            exp: None,
            label: None,
        };
        let encoded = token::encode(&wire_token).unwrap();
        let sealed = envelope_mod::encrypt(b"payload", &key, "application/fhir+json").unwrap();

        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.key, key);

        let opened = decrypt(&sealed, &decoded.key).unwrap();
        assert_eq!(opened.data, b"payload");
    }
}
