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

//! Direct-key AEAD envelope: a five-segment compact form carrying a header,
//! an empty wrapped-key segment, an IV, ciphertext and an auth tag. Only one
//! `alg`/`enc` combination is supported -- there is no general JOSE stack
//! here, just the one shape this protocol needs.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use flate2::write::DeflateEncoder;
use flate2::read::DeflateDecoder;
use flate2::Compression;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::error::ShlError;

const IV_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EnvelopeHeader {
    alg: String,
    enc: String,
    cty: String,
    zip: String,
}

/// Plaintext recovered from a successful [`decrypt`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decrypted {
    pub content_type: String,
    pub data: Vec<u8>,
}

fn compress(plaintext: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
    enc.write_all(plaintext)?;
    enc.finish()
}

fn decompress(compressed: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut dec = DeflateDecoder::new(compressed);
    let mut out = Vec::new();
    dec.read_to_end(&mut out)?;
    Ok(out)
}

/// Encrypt `plaintext` of the given `content_type` under `key`, returning
/// the five-segment `header..iv.ciphertext.tag` envelope string.
pub fn encrypt(plaintext: &[u8], key: &[u8; KEY_LEN], content_type: &str) -> Result<String, ShlError> {
    let compressed = compress(plaintext)
        .map_err(|e| ShlError::Encryption(format!("deflate failed: {e}")))?;

    let header = EnvelopeHeader {
        alg: "dir".to_string(),
        enc: "A256GCM".to_string(),
        cty: content_type.to_string(),
        zip: "DEF".to_string(),
    };
    let header_json = serde_json::to_vec(&header)
        .map_err(|e| ShlError::Encryption(format!("header serialization failed: {e}")))?;
    let header_b64 = URL_SAFE_NO_PAD.encode(&header_json);

    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let aad = header_b64.as_bytes();
    let sealed = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &compressed,
                aad,
            },
        )
        .map_err(|_| ShlError::Encryption("AEAD seal failed".to_string()))?;

    // aes-gcm appends the 16-byte tag to the ciphertext; split it back apart
    // so the wire format carries them as separate segments.
    let tag_start = sealed.len() - 16;
    let (ct, tag) = sealed.split_at(tag_start);

    Ok(format!(
        "{header}..{iv}.{ct}.{tag}",
        header = header_b64,
        iv = URL_SAFE_NO_PAD.encode(iv),
        ct = URL_SAFE_NO_PAD.encode(ct),
        tag = URL_SAFE_NO_PAD.encode(tag),
    ))
}

/// Decrypt a five-segment envelope produced by [`encrypt`]. Any structural,
/// authentication, or decompression failure collapses to `DecryptFailed` --
/// by design, a caller cannot tell a wrong key from a tampered ciphertext.
pub fn decrypt(envelope: &str, key: &[u8; KEY_LEN]) -> Result<Decrypted, ShlError> {
    let segments: Vec<&str> = envelope.split('.').collect();
    if segments.len() != 5 {
        return Err(ShlError::DecryptFailed);
    }
    let [header_b64, wrapped_key, iv_b64, ct_b64, tag_b64] = segments[..] else {
        return Err(ShlError::DecryptFailed);
    };
    if !wrapped_key.is_empty() {
        return Err(ShlError::DecryptFailed);
    }

    let header_json = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|_| ShlError::DecryptFailed)?;
    let header: EnvelopeHeader =
        serde_json::from_slice(&header_json).map_err(|_| ShlError::DecryptFailed)?;
    if header.alg != "dir" || header.enc != "A256GCM" {
        return Err(ShlError::DecryptFailed);
    }

    let iv = URL_SAFE_NO_PAD.decode(iv_b64).map_err(|_| ShlError::DecryptFailed)?;
    if iv.len() != IV_LEN {
        return Err(ShlError::DecryptFailed);
    }
    let ct = URL_SAFE_NO_PAD.decode(ct_b64).map_err(|_| ShlError::DecryptFailed)?;
    let tag = URL_SAFE_NO_PAD.decode(tag_b64).map_err(|_| ShlError::DecryptFailed)?;
    if tag.len() != 16 {
        return Err(ShlError::DecryptFailed);
    }

    let mut sealed = ct;
    sealed.extend_from_slice(&tag);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let aad = header_b64.as_bytes();
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &sealed,
                aad,
            },
        )
        .map_err(|_| ShlError::DecryptFailed)?;

    let data = if header.zip == "DEF" {
        decompress(&plaintext).map_err(|_| ShlError::DecryptFailed)?
    } else {
        plaintext
    };

    Ok(Decrypted {
        content_type: if header.cty.is_empty() {
            "application/octet-stream".to_string()
        } else {
            header.cty
        },
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; 32] {
        let mut k = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut k);
        k
    }

    #[test]
    fn round_trips_plaintext_and_content_type() {
        let k = key();
        let envelope = encrypt(b"hello world", &k, "application/fhir+json").unwrap();
        let decrypted = decrypt(&envelope, &k).unwrap();
        assert_eq!(decrypted.data, b"hello world");
        assert_eq!(decrypted.content_type, "application/fhir+json");
    }

    #[test]
    fn envelope_has_five_segments_with_empty_second() {
        let k = key();
        let envelope = encrypt(b"{}", &k, "application/json").unwrap();
        let segments: Vec<&str> = envelope.split('.').collect();
        assert_eq!(segments.len(), 5);
        assert_eq!(segments[1], "");
    }

    #[test]
    fn wrong_key_fails_without_distinguishing_cause() {
        let k1 = key();
        let k2 = key();
        let envelope = encrypt(b"secret", &k1, "application/json").unwrap();
        let err = decrypt(&envelope, &k2).unwrap_err();
        assert!(matches!(err, ShlError::DecryptFailed));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let k = key();
        let mut envelope = encrypt(b"secret", &k, "application/json").unwrap();
        envelope.push('x');
        assert!(decrypt(&envelope, &k).is_err());
    }

    #[test]
    fn malformed_segment_count_fails() {
        let k = key();
        assert!(decrypt("a.b.c", &k).is_err());
    }

    #[test]
    fn large_plaintext_round_trips() {
        let k = key();
        let plaintext = vec![7u8; 100_000];
        let envelope = encrypt(&plaintext, &k, "application/octet-stream").unwrap();
        let decrypted = decrypt(&envelope, &k).unwrap();
        assert_eq!(decrypted.data, plaintext);
    }
}
