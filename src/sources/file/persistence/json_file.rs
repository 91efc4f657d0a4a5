// SPDX-License-Identifier: Apache-2.0

//! JSON file-based position store with atomic, durable writes.
//!
//! Writes go to a temp file which is synced and then renamed over the state
//! file, so a crash leaves either the old or the new checkpoint, never a torn one.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::warn;

use super::schema::{PERSISTED_STATE_VERSION, PersistedPosition, PersistedStateV1, path_to_key};
use super::store::PositionStore;
use crate::sources::file::error::{Error, Result};
use crate::sources::file::file_id::FileId;

/// Position store backed by a single JSON side file.
#[derive(Debug)]
pub struct JsonFilePositionStore {
    path: PathBuf,
    state: PersistedStateV1,
}

impl JsonFilePositionStore {
    /// Open the state file at `path`.
    ///
    /// A missing file yields an empty store. A file that cannot be parsed, or
    /// carries an unknown schema version, is logged and treated as holding no
    /// checkpoints; the next commit replaces it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = read_state(&path)?;
        Ok(Self { path, state })
    }

    /// A store for `path` that starts with no checkpoints, without reading it.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: PersistedStateV1::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PositionStore for JsonFilePositionStore {
    fn load(&self, path: &Path) -> Result<Option<PersistedPosition>> {
        Ok(self.state.positions.get(&path_to_key(path)).copied())
    }

    /// Merge `path`'s position into the state file.
    ///
    /// The file is re-read under a process-wide lock before writing, so stores
    /// of several sources sharing one state file keep each other's positions.
    fn commit(&mut self, path: &Path, file_id: FileId, offset: u64) -> Result<()> {
        let _guard = COMMIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

        let mut state = read_state(&self.path)?;
        state
            .positions
            .insert(path_to_key(path), PersistedPosition::new(file_id, offset));
        atomic_write(&self.path, &state)?;

        self.state = state;
        Ok(())
    }
}

static COMMIT_LOCK: Mutex<()> = Mutex::new(());

/// Read the state file. A missing file is empty. A file that cannot be parsed,
/// or carries an unknown schema version, is logged and treated as empty.
fn read_state(path: &Path) -> Result<PersistedStateV1> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(PersistedStateV1::default()),
        Err(e) => {
            return Err(Error::Persistence(format!(
                "failed to open state file {:?}: {}",
                path, e
            )));
        }
    };

    let state = match serde_json::from_reader::<_, PersistedStateV1>(BufReader::new(file)) {
        Ok(state) if state.version == PERSISTED_STATE_VERSION => state,
        Ok(state) => {
            warn!(
                path = ?path,
                version = state.version,
                "Ignoring state file with unsupported version"
            );
            PersistedStateV1::default()
        }
        Err(e) => {
            warn!(path = ?path, error = %e, "Ignoring unparseable state file");
            PersistedStateV1::default()
        }
    };
    Ok(state)
}

/// Write state to file atomically (write to temp, sync, then rename)
fn atomic_write(path: &Path, state: &PersistedStateV1) -> Result<()> {
    use portable_atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Persistence(format!("failed to create parent directory: {}", e))
            })?;
        }
    }

    // Unique temp name so two stores in one process never share a temp file
    let unique_id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let temp_path = path.with_extension(format!("tmp.{}.{}", std::process::id(), unique_id));

    let file = File::create(&temp_path)
        .map_err(|e| Error::Persistence(format!("failed to create temp file: {}", e)))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, state)
        .map_err(|e| Error::Persistence(format!("failed to write state: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::Persistence(format!("failed to flush state: {}", e)))?;

    let file = writer
        .into_inner()
        .map_err(|e| Error::Persistence(format!("failed to flush state: {}", e)))?;
    file.sync_all()
        .map_err(|e| Error::Persistence(format!("failed to sync state: {}", e)))?;
    drop(file);

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::Persistence(format!(
            "failed to rename state file: {}",
            e
        )));
    }

    sync_parent_dir(path);
    Ok(())
}

/// Persist the rename itself. Best effort: not every platform allows opening
/// a directory for syncing.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if let Ok(dir) = File::open(parent) {
        let _ = dir.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}
