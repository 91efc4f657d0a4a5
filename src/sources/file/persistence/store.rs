// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::schema::{PersistedPosition, path_to_key};
use crate::sources::file::error::{Error, Result};
use crate::sources::file::file_id::FileId;

/// Durable mapping from a source path to the last confirmed offset.
///
/// Only the tailer loop calls `commit`, so implementations do not need to
/// coordinate concurrent writers. `commit` must be durable before it returns.
pub trait PositionStore: Send {
    /// Read the checkpoint recorded for `path`, if any.
    fn load(&self, path: &Path) -> Result<Option<PersistedPosition>>;

    /// Record that every record of `file_id` up to `offset` has been dispatched.
    /// Last write wins.
    fn commit(&mut self, path: &Path, file_id: FileId, offset: u64) -> Result<()>;
}

impl<S: PositionStore + ?Sized> PositionStore for Box<S> {
    fn load(&self, path: &Path) -> Result<Option<PersistedPosition>> {
        (**self).load(path)
    }

    fn commit(&mut self, path: &Path, file_id: FileId, offset: u64) -> Result<()> {
        (**self).commit(path, file_id, offset)
    }
}

/// In-process position store.
///
/// Clones share the same positions, so a caller can keep a handle and hand a
/// clone to a source to observe or carry checkpoints across source restarts.
#[derive(Debug, Clone, Default)]
pub struct MemoryPositionStore {
    positions: Arc<Mutex<HashMap<String, PersistedPosition>>>,
}

impl MemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current position for `path`, if one was committed.
    pub fn get(&self, path: &Path) -> Option<PersistedPosition> {
        self.positions
            .lock()
            .ok()
            .and_then(|positions| positions.get(&path_to_key(path)).copied())
    }
}

impl PositionStore for MemoryPositionStore {
    fn load(&self, path: &Path) -> Result<Option<PersistedPosition>> {
        let positions = self
            .positions
            .lock()
            .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(positions.get(&path_to_key(path)).copied())
    }

    fn commit(&mut self, path: &Path, file_id: FileId, offset: u64) -> Result<()> {
        let mut positions = self
            .positions
            .lock()
            .map_err(|e| Error::Persistence(e.to_string()))?;
        positions.insert(path_to_key(path), PersistedPosition::new(file_id, offset));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_last_write_wins() {
        let mut store = MemoryPositionStore::new();
        let path = Path::new("/var/log/app.log");

        assert!(store.load(path).unwrap().is_none());

        store.commit(path, FileId::new(1, 10), 100).unwrap();
        store.commit(path, FileId::new(1, 10), 250).unwrap();

        let position = store.load(path).unwrap().unwrap();
        assert_eq!(position.offset, 250);
        assert!(position.matches(&FileId::new(1, 10)));
    }

    #[test]
    fn test_memory_store_clones_share_positions() {
        let store = MemoryPositionStore::new();
        let mut boxed: Box<dyn PositionStore> = Box::new(store.clone());
        let path = Path::new("/var/log/app.log");

        boxed.commit(path, FileId::new(3, 4), 42).unwrap();

        assert_eq!(store.get(path).map(|p| p.offset), Some(42));
    }

    #[test]
    fn test_memory_store_paths_are_independent() {
        let mut store = MemoryPositionStore::new();
        store
            .commit(Path::new("/a.log"), FileId::new(1, 1), 1)
            .unwrap();
        store
            .commit(Path::new("/b.log"), FileId::new(1, 2), 2)
            .unwrap();

        assert_eq!(store.get(Path::new("/a.log")).unwrap().offset, 1);
        assert_eq!(store.get(Path::new("/b.log")).unwrap().offset, 2);
    }
}
