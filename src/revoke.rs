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

//! Revocation: a free function rather than an engine method, since a
//! producer may want to revoke an SHL without standing up an access-control
//! engine at all.

use crate::error::ShlError;
use crate::storage::WriteOnlyStorage;

/// Delete every stored artifact for `shl_id`. Idempotent: a second call
/// after revocation must not error, and afterward every engine route for
/// this id returns 404.
pub async fn revoke(shl_id: &str, storage: &dyn WriteOnlyStorage) -> Result<(), ShlError> {
    storage.delete(&format!("{shl_id}/")).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::model::BuilderOptions;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::ServerStorage;

    #[tokio::test]
    async fn revoke_is_idempotent_and_removes_all_artifacts() {
        let storage = MemoryStorage::new("https://shl.example.org").unwrap();
        let built = build(b"{}", &storage, BuilderOptions::default()).await.unwrap();

        revoke(&built.shl_id, &storage).await.unwrap();
        revoke(&built.shl_id, &storage).await.unwrap();

        assert!(storage
            .read(&format!("{}/manifest.json", built.shl_id))
            .await
            .unwrap()
            .is_none());
        assert!(storage
            .read(&format!("{}/metadata.json", built.shl_id))
            .await
            .unwrap()
            .is_none());
        assert!(storage
            .read(&format!("{}/content.jwe", built.shl_id))
            .await
            .unwrap()
            .is_none());
    }
}
