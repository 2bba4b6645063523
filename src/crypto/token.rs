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

//! The `shlink:/…` token: a URL-safe-Base64 JSON payload carrying the
//! manifest URL and the content key. No signing, no envelope -- the token
//! itself is the secret, so it rides in a fragment or out-of-band channel.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::ShlError;

const PREFIX: &str = "shlink:/";
const LABEL_MAX_CODE_POINTS: usize = 80;

/// The decoded contents of a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub url: String,
    pub key: [u8; 32],
    pub flag: String,
    pub v: i64,
    pub exp: Option<i64>,
    pub label: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenPayload {
    url: String,
    key: String,
    flag: String,
    #[serde(default = "default_v")]
    v: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    label: Option<String>,
}

fn default_v() -> i64 {
    1
}

fn sorted_flag(flag: &str) -> String {
    let mut chars: Vec<char> = flag.chars().collect();
    chars.sort_unstable();
    chars.into_iter().collect()
}

fn truncate_label(label: &str) -> String {
    label.chars().take(LABEL_MAX_CODE_POINTS).collect()
}

/// Encode a [`Token`] into its `shlink:/…` wire form.
pub fn encode(token: &Token) -> Result<String, ShlError> {
    let payload = TokenPayload {
        url: token.url.clone(),
        key: URL_SAFE_NO_PAD.encode(token.key),
        flag: sorted_flag(&token.flag),
        v: token.v,
        exp: token.exp,
        label: token.label.as_deref().map(truncate_label),
    };
    let json = serde_json::to_vec(&payload)
        .map_err(|e| ShlError::Validation(format!("token serialization failed: {e}")))?;
    Ok(format!("{PREFIX}{}", URL_SAFE_NO_PAD.encode(json)))
}

/// Decode a `shlink:/…` token back into its fields, with strict validation:
/// missing/wrong-typed/wrong-length fields fail with `InvalidToken`.
pub fn decode(raw: &str) -> Result<Token, ShlError> {
    let payload_b64 = raw
        .strip_prefix(PREFIX)
        .ok_or_else(|| ShlError::InvalidToken("missing shlink:/ prefix".to_string()))?;
    if payload_b64.is_empty() {
        return Err(ShlError::InvalidToken("empty payload".to_string()));
    }

    let json = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| ShlError::InvalidToken("payload is not valid base64url".to_string()))?;

    let payload: TokenPayload =
        serde_json::from_slice(&json).map_err(|_| ShlError::InvalidToken("payload is not valid JSON".to_string()))?;

    let key_bytes = URL_SAFE_NO_PAD
        .decode(&payload.key)
        .map_err(|_| ShlError::InvalidToken("key is not valid base64url".to_string()))?;
    let key: [u8; 32] = key_bytes
        .try_into()
        .map_err(|_| ShlError::InvalidToken("key must decode to 32 bytes".to_string()))?;

    Ok(Token {
        url: payload.url,
        key,
        flag: sorted_flag(&payload.flag),
        v: payload.v,
        exp: payload.exp,
        label: payload.label,
    })
}
