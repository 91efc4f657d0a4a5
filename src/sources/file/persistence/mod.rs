// SPDX-License-Identifier: Apache-2.0

//! Persistence for tailer checkpoints.
//!
//! Uses JSON file storage with atomic writes for reliable offset tracking.

mod json_file;
mod schema;
mod store;

pub use json_file::JsonFilePositionStore;
pub use schema::{PERSISTED_STATE_VERSION, PersistedPosition, PersistedStateV1, path_to_key};
pub use store::{MemoryPositionStore, PositionStore};
