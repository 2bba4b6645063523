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

//! SDK for SMART Health Links: a short shareable token that resolves to an
//! encrypted manifest hosted on an operator-controlled endpoint.
//!
//! Five pieces, leaves first: [`crypto`] is the envelope and token format;
//! [`storage`] is the pluggable blob/metadata abstraction; [`builder`] turns
//! a document into a shareable token; [`engine`] is the server-side
//! access-control state machine; [`decoder`] and [`revoke`] are the
//! consumer- and producer-side teardown operations.

pub mod builder;
pub mod crypto;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod model;
pub mod revoke;
pub mod storage;

pub use builder::build;
pub use decoder::{decode, decrypt};
pub use error::{ShlError, StorageOp};
pub use model::{AccessEvent, Attachment, BuilderOptions, BuiltShl, CorsConfig, FileEntry, Manifest, Metadata};
pub use revoke::revoke;
