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

//! The access-control engine: a pure transformer from a protocol-level
//! request to a response, over a [`ServerStorage`] collaborator. No global
//! state; one engine instance per configured storage backend. Framework
//! adapters translate whatever web stack an operator runs into the
//! `Request`/`Response` shapes here.

use std::sync::Arc;

use chrono::Utc;
use http::{Method, StatusCode};
use subtle::ConstantTimeEq;

use crate::crypto::hash_passcode;
use crate::model::{AccessEvent, CorsConfig, Metadata};
use crate::storage::{self, DenyReason, ServerStorage, UpdateOutcome, UpdateResult};

/// An incoming protocol-level request. `path` is the raw request path
/// (leading slashes and empty segments are normalised internally).
pub struct Request {
    pub method: Method,
    pub path: String,
    pub body: Option<Vec<u8>>,
}

/// An outgoing protocol-level response.
pub struct Response {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    fn json(status: StatusCode, body: String) -> Self {
        Response {
            status,
            headers: vec![
                ("content-type".to_string(), "application/json".to_string()),
                ("cache-control".to_string(), "no-store".to_string()),
            ],
            body: body.into_bytes(),
        }
    }

    fn error(status: StatusCode, message: &str) -> Self {
        Self::json(status, format!(r#"{{"error":"{message}"}}"#))
    }

    fn not_found() -> Self {
        Self::error(StatusCode::NOT_FOUND, "Not found")
    }
}

pub type AccessEventCallback = Arc<dyn Fn(AccessEvent) + Send + Sync>;

/// Engine configuration: the storage backend it operates over, CORS policy,
/// and an optional access-event callback.
pub struct EngineConfig {
    pub storage: Arc<dyn ServerStorage>,
    pub cors: CorsConfig,
    pub on_access: Option<AccessEventCallback>,
}

pub struct Engine {
    config: EngineConfig,
}

enum Route {
    Manifest { shl_id: String },
    Content { shl_id: String },
    Attachment { shl_id: String, index_raw: String },
    Cors,
}

fn normalize_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

fn match_route(method: &Method, path: &str) -> Option<(Route, Method)> {
    if method == Method::OPTIONS {
        return Some((Route::Cors, Method::OPTIONS));
    }

    let segments = normalize_path(path);
    match segments.as_slice() {
        [shl_id] => Some((Route::Manifest { shl_id: shl_id.to_string() }, Method::POST)),
        [shl_id, "content"] => Some((
            Route::Content { shl_id: shl_id.to_string() },
            Method::GET,
        )),
        [shl_id, "attachment", index] => Some((
            Route::Attachment {
                shl_id: shl_id.to_string(),
                index_raw: index.to_string(),
            },
            Method::GET,
        )),
        _ => None,
    }
}

/// Constant-time comparison of two hex hash strings. Unequal lengths
/// short-circuit to "unequal" without leaking timing information about the
/// prefix that would otherwise compare.
fn hashes_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[derive(serde::Deserialize, Default)]
struct ManifestRequestBody {
    passcode: Option<String>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Engine { config }
    }

    fn cors_headers(&self) -> Vec<(String, String)> {
        if self.config.cors.disabled {
            return Vec::new();
        }
        vec![
            (
                "access-control-allow-origin".to_string(),
                self.config.cors.allow_origin.clone(),
            ),
            (
                "access-control-allow-methods".to_string(),
                self.config.cors.allow_methods.clone(),
            ),
            (
                "access-control-allow-headers".to_string(),
                self.config.cors.allow_headers.clone(),
            ),
        ]
    }

    fn with_cors(&self, mut response: Response) -> Response {
        response.headers.extend(self.cors_headers());
        response
    }

    /// Handle one request, dispatching to the matching route or returning
    /// 404/405 after normalizing the path.
    pub async fn handle(&self, request: Request) -> Response {
        let response = self.handle_inner(request).await;
        self.with_cors(response)
    }

    async fn handle_inner(&self, request: Request) -> Response {
        if request.method == Method::OPTIONS {
            return Response {
                status: StatusCode::NO_CONTENT,
                headers: Vec::new(),
                body: Vec::new(),
            };
        }

        let Some((route, expected_method)) = match_route(&request.method, &request.path) else {
            // match_route matches on path shape alone (except OPTIONS), so
            // reaching here means the path matches none of the known
            // routes at all.
            return Response::not_found();
        };

        if request.method != expected_method {
            return Response {
                status: StatusCode::METHOD_NOT_ALLOWED,
                headers: Vec::new(),
                body: Vec::new(),
            };
        }

        match route {
            Route::Manifest { shl_id } => self.handle_manifest(&shl_id, request.body).await,
            Route::Content { shl_id } => self.handle_content(&shl_id).await,
            Route::Attachment { shl_id, index_raw } => {
                self.handle_attachment(&shl_id, &index_raw).await
            }
            Route::Cors => unreachable!("OPTIONS is handled above"),
        }
    }

    async fn handle_manifest(&self, shl_id: &str, body: Option<Vec<u8>>) -> Response {
        let manifest_bytes = match self.config.storage.read(&storage::manifest_key(shl_id)).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Response::not_found(),
            Err(e) => {
                log::error!("storage error reading manifest for {shl_id}: {e}");
                return Response::not_found();
            }
        };

        let provided_passcode = body
            .as_deref()
            .and_then(|b| serde_json::from_slice::<ManifestRequestBody>(b).ok())
            .and_then(|b| b.passcode)
            .unwrap_or_default();

        let now = Utc::now();
        let updater = move |md: &Metadata| -> UpdateOutcome {
            if let Some(expires_at) = md.expires_at {
                if expires_at <= now {
                    return UpdateOutcome::Deny(DenyReason::Expired);
                }
            }
            if let Some(max_accesses) = md.max_accesses {
                if md.access_count >= max_accesses {
                    return UpdateOutcome::Deny(DenyReason::Exhausted);
                }
            }
            if let Some(expected_hash) = &md.passcode_hash {
                // Hash unconditionally, whether or not a passcode was
                // supplied, so the missing-passcode path costs the same as
                // the wrong-passcode path.
                let provided_hash = hash_passcode(&provided_passcode);
                if !hashes_equal(&provided_hash, expected_hash) {
                    return UpdateOutcome::Deny(DenyReason::Passcode);
                }
            }
            let mut next = md.clone();
            next.access_count += 1;
            UpdateOutcome::Commit(next)
        };

        let result = self.config.storage.update_metadata(shl_id, &updater).await;
        let result = match result {
            Ok(r) => r,
            Err(e) => {
                log::error!("storage error during manifest update for {shl_id}: {e}");
                return Response::error(StatusCode::NOT_FOUND, "Not found");
            }
        };

        match result {
            UpdateResult::Denied(DenyReason::Expired) => {
                Response::error(StatusCode::GONE, "SHL has expired")
            }
            UpdateResult::Denied(DenyReason::Exhausted) => {
                Response::error(StatusCode::GONE, "SHL access limit reached")
            }
            UpdateResult::Denied(DenyReason::Passcode) => {
                Response::error(StatusCode::UNAUTHORIZED, "Invalid passcode")
            }
            UpdateResult::NotFound => Response::not_found(),
            UpdateResult::Committed(new_md) => {
                self.dispatch_access_event(shl_id, new_md.access_count);
                Response {
                    status: StatusCode::OK,
                    headers: vec![
                        ("content-type".to_string(), "application/json".to_string()),
                        ("cache-control".to_string(), "no-store".to_string()),
                    ],
                    body: manifest_bytes,
                }
            }
        }
    }

    async fn handle_content(&self, shl_id: &str) -> Response {
        self.serve_jwe(&storage::content_key(shl_id)).await
    }

    async fn handle_attachment(&self, shl_id: &str, index_raw: &str) -> Response {
        if !index_raw.chars().all(|c| c.is_ascii_digit()) || index_raw.is_empty() {
            return Response::error(StatusCode::BAD_REQUEST, "Invalid attachment index");
        }
        let Ok(index) = index_raw.parse::<u64>() else {
            return Response::error(StatusCode::BAD_REQUEST, "Invalid attachment index");
        };
        self.serve_jwe(&storage::attachment_key(shl_id, index)).await
    }

    async fn serve_jwe(&self, key: &str) -> Response {
        match self.config.storage.read(key).await {
            Ok(Some(bytes)) => Response {
                status: StatusCode::OK,
                headers: vec![("content-type".to_string(), "application/jose".to_string())],
                body: bytes,
            },
            Ok(None) => Response::not_found(),
            Err(e) => {
                log::error!("storage error reading {key}: {e}");
                Response::not_found()
            }
        }
    }

    fn dispatch_access_event(&self, shl_id: &str, access_count: u64) {
        let Some(callback) = self.config.on_access.clone() else {
            return;
        };
        let event = AccessEvent {
            shl_id: shl_id.to_string(),
            access_count,
            timestamp: Utc::now(),
        };
        // Fire-and-forget: delivery never gates the response, and a panic
        // in the callback must not affect it either.
        tokio::spawn(async move {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(event)));
            if result.is_err() {
                log::warn!("access-event callback panicked");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BuilderOptions;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::WriteOnlyStorage;

    async fn engine_over(storage: Arc<MemoryStorage>) -> Engine {
        let _ = env_logger::try_init();
        Engine::new(EngineConfig {
            storage,
            cors: CorsConfig::default(),
            on_access: None,
        })
    }

    async fn build_sample(storage: &MemoryStorage, options: BuilderOptions) -> crate::model::BuiltShl {
        crate::builder::build(br#"{"resourceType":"Bundle"}"#, storage, options)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn plain_manifest_access_returns_200_with_one_file() {
        let storage = Arc::new(MemoryStorage::new("https://shl.example.org").unwrap());
        let built = build_sample(&storage, BuilderOptions::default()).await;
        let engine = engine_over(storage).await;

        let response = engine
            .handle(Request {
                method: Method::POST,
                path: format!("/{}", built.shl_id),
                body: Some(b"{}".to_vec()),
            })
            .await;

        assert_eq!(response.status, StatusCode::OK);
        let manifest: crate::model::Manifest = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.files[0].content_type, "application/fhir+json");
    }

    #[tokio::test]
    async fn passcode_gating_matches_scenario_2() {
        let storage = Arc::new(MemoryStorage::new("https://shl.example.org").unwrap());
        let mut options = BuilderOptions::default();
        options.passcode = Some("secret42".to_string());
        let built = build_sample(&storage, options).await;
        let engine = engine_over(storage).await;

        let no_passcode = engine
            .handle(Request {
                method: Method::POST,
                path: format!("/{}", built.shl_id),
                body: Some(b"{}".to_vec()),
            })
            .await;
        assert_eq!(no_passcode.status, StatusCode::UNAUTHORIZED);

        let wrong_passcode = engine
            .handle(Request {
                method: Method::POST,
                path: format!("/{}", built.shl_id),
                body: Some(br#"{"passcode":"wrong"}"#.to_vec()),
            })
            .await;
        assert_eq!(wrong_passcode.status, StatusCode::UNAUTHORIZED);

        let right_passcode = engine
            .handle(Request {
                method: Method::POST,
                path: format!("/{}", built.shl_id),
                body: Some(br#"{"passcode":"secret42"}"#.to_vec()),
            })
            .await;
        assert_eq!(right_passcode.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn access_count_exhaustion_matches_scenario_3() {
        let storage = Arc::new(MemoryStorage::new("https://shl.example.org").unwrap());
        let mut options = BuilderOptions::default();
        options.max_accesses = Some(2);
        let built = build_sample(&storage, options).await;
        let engine = engine_over(storage).await;

        let mut statuses = Vec::new();
        for _ in 0..3 {
            let response = engine
                .handle(Request {
                    method: Method::POST,
                    path: format!("/{}", built.shl_id),
                    body: Some(b"{}".to_vec()),
                })
                .await;
            statuses.push(response.status);
        }
        assert_eq!(
            statuses,
            vec![StatusCode::OK, StatusCode::OK, StatusCode::GONE]
        );
    }

    #[tokio::test]
    async fn max_accesses_zero_always_denies() {
        let storage = Arc::new(MemoryStorage::new("https://shl.example.org").unwrap());
        let mut options = BuilderOptions::default();
        options.max_accesses = Some(0);
        let built = build_sample(&storage, options).await;
        let engine = engine_over(storage).await;

        let response = engine
            .handle(Request {
                method: Method::POST,
                path: format!("/{}", built.shl_id),
                body: Some(b"{}".to_vec()),
            })
            .await;
        assert_eq!(response.status, StatusCode::GONE);
    }

    #[tokio::test]
    async fn expired_beats_exhausted_beats_passcode() {
        let storage = Arc::new(MemoryStorage::new("https://shl.example.org").unwrap());
        let mut options = BuilderOptions::default();
        options.max_accesses = Some(0);
        options.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
        options.passcode = Some("secret".to_string());
        let built = build_sample(&storage, options).await;
        let engine = engine_over(storage).await;

        let response = engine
            .handle(Request {
                method: Method::POST,
                path: format!("/{}", built.shl_id),
                body: Some(b"{}".to_vec()),
            })
            .await;
        assert_eq!(response.status, StatusCode::GONE);
        assert!(String::from_utf8_lossy(&response.body).contains("expired"));
    }

    #[tokio::test]
    async fn unknown_path_is_404_known_path_wrong_method_is_405() {
        let storage = Arc::new(MemoryStorage::new("https://shl.example.org").unwrap());
        let built = build_sample(&storage, BuilderOptions::default()).await;
        let engine = engine_over(storage).await;

        let unknown = engine
            .handle(Request {
                method: Method::GET,
                path: "/not/a/real/route/at/all".to_string(),
                body: None,
            })
            .await;
        assert_eq!(unknown.status, StatusCode::NOT_FOUND);

        let wrong_method = engine
            .handle(Request {
                method: Method::GET,
                path: format!("/{}", built.shl_id),
                body: None,
            })
            .await;
        assert_eq!(wrong_method.status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn non_numeric_attachment_index_is_400_missing_index_is_404() {
        let storage = Arc::new(MemoryStorage::new("https://shl.example.org").unwrap());
        let built = build_sample(&storage, BuilderOptions::default()).await;
        let engine = engine_over(storage).await;

        let bad_index = engine
            .handle(Request {
                method: Method::GET,
                path: format!("/{}/attachment/not-a-number", built.shl_id),
                body: None,
            })
            .await;
        assert_eq!(bad_index.status, StatusCode::BAD_REQUEST);

        let missing_index = engine
            .handle(Request {
                method: Method::GET,
                path: format!("/{}/attachment/5", built.shl_id),
                body: None,
            })
            .await;
        assert_eq!(missing_index.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn attachment_index_overflowing_u64_is_400_not_a_panic() {
        let storage = Arc::new(MemoryStorage::new("https://shl.example.org").unwrap());
        let built = build_sample(&storage, BuilderOptions::default()).await;
        let engine = engine_over(storage).await;

        let overflowing = engine
            .handle(Request {
                method: Method::GET,
                path: format!("/{}/attachment/99999999999999999999999999", built.shl_id),
                body: None,
            })
            .await;
        assert_eq!(overflowing.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_manifest_denies_before_touching_access_count() {
        let storage = Arc::new(MemoryStorage::new("https://shl.example.org").unwrap());
        let built = build_sample(&storage, BuilderOptions::default()).await;
        storage.delete(&format!("{}/manifest.json", built.shl_id)).await.unwrap();
        let engine = engine_over(storage.clone()).await;

        let response = engine
            .handle(Request {
                method: Method::POST,
                path: format!("/{}", built.shl_id),
                body: Some(b"{}".to_vec()),
            })
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);

        let metadata_bytes = storage
            .read(&format!("{}/metadata.json", built.shl_id))
            .await
            .unwrap()
            .unwrap();
        let metadata: crate::model::Metadata = serde_json::from_slice(&metadata_bytes).unwrap();
        assert_eq!(metadata.access_count, 0);
    }

    #[tokio::test]
    async fn options_always_returns_204_with_cors_headers() {
        let storage = Arc::new(MemoryStorage::new("https://shl.example.org").unwrap());
        let engine = engine_over(storage).await;
        let response = engine
            .handle(Request {
                method: Method::OPTIONS,
                path: "/whatever".to_string(),
                body: None,
            })
            .await;
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert!(response
            .headers
            .iter()
            .any(|(k, _)| k == "access-control-allow-origin"));
    }
}
