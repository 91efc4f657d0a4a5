// SPDX-License-Identifier: Apache-2.0

//! Persistence schema definitions for tailer checkpoints.
//!
//! The state file holds one entry per watched source path:
//!
//! ```json
//! {"version":1,"positions":{"/var/log/app.log":{"dev":2049,"ino":1234,"offset":512}}}
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::sources::file::file_id::FileId;

/// Current schema version for persisted state
pub const PERSISTED_STATE_VERSION: u8 = 1;

/// Persisted state for all watched paths (v1)
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedStateV1 {
    /// Schema version (always 1 for this format)
    pub version: u8,
    /// Map from source path to its last confirmed position
    pub positions: HashMap<String, PersistedPosition>,
}

impl Default for PersistedStateV1 {
    fn default() -> Self {
        Self {
            version: PERSISTED_STATE_VERSION,
            positions: HashMap::new(),
        }
    }
}

/// Last confirmed position for a single source path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedPosition {
    /// Device ID of the file the offset belongs to
    pub dev: u64,
    /// Inode number of the file the offset belongs to
    pub ino: u64,
    /// Byte offset up to which every record has been dispatched
    pub offset: u64,
}

impl PersistedPosition {
    pub fn new(file_id: FileId, offset: u64) -> Self {
        Self {
            dev: file_id.dev(),
            ino: file_id.ino(),
            offset,
        }
    }

    pub fn file_id(&self) -> FileId {
        FileId::new(self.dev, self.ino)
    }

    /// A checkpoint is only usable for the file it was taken from.
    pub fn matches(&self, file_id: &FileId) -> bool {
        self.file_id() == *file_id
    }
}

/// Generate the map key for a source path
pub fn path_to_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persisted_state_v1_default() {
        let state = PersistedStateV1::default();
        assert_eq!(state.version, PERSISTED_STATE_VERSION);
        assert!(state.positions.is_empty());
    }

    #[test]
    fn test_position_matches_identity() {
        let position = PersistedPosition::new(FileId::new(1, 100), 500);
        assert!(position.matches(&FileId::new(1, 100)));
        assert!(!position.matches(&FileId::new(1, 101)));
        assert!(!position.matches(&FileId::new(2, 100)));
    }

    #[test]
    fn test_v1_layout() {
        let mut state = PersistedStateV1::default();
        state.positions.insert(
            path_to_key(Path::new("/var/log/app.log")),
            PersistedPosition::new(FileId::new(1, 100), 500),
        );

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["positions"]["/var/log/app.log"]["ino"], 100);
        assert_eq!(json["positions"]["/var/log/app.log"]["offset"], 500);
    }
}
