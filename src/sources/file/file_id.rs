// SPDX-License-Identifier: Apache-2.0

//! Platform-independent file identity.
//!
//! On Unix the identity is the device ID + inode number, which survives renames
//! and changes whenever a new file is created at the same path. Elsewhere the
//! identity falls back to a hash of the creation time and path.

use serde::{Deserialize, Serialize};
use std::fs::{self, File, Metadata};
use std::io;
use std::path::{Path, PathBuf};

/// Identifies which physical file a path currently denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId {
    /// Device ID (Unix) or zero on the fallback platform
    dev: u64,
    /// Inode number (Unix) or creation-time/path hash on the fallback platform
    ino: u64,
}

impl FileId {
    /// Identity from raw values, as stored in a checkpoint.
    pub const fn new(dev: u64, ino: u64) -> Self {
        Self { dev, ino }
    }

    /// Create a FileId from metadata already fetched for `path`.
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata, _path: &Path) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    /// Create a FileId from metadata already fetched for `path`.
    #[cfg(not(unix))]
    pub fn from_metadata(metadata: &Metadata, path: &Path) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let created = metadata
            .created()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or_default();

        let mut hasher = DefaultHasher::new();
        created.hash(&mut hasher);
        path.hash(&mut hasher);

        Self {
            dev: 0,
            ino: hasher.finish(),
        }
    }

    /// Identity of the file behind `file`, regardless of where it lives now.
    pub fn from_file(file: &File, path: &Path) -> io::Result<Self> {
        let metadata = file.metadata()?;
        Ok(Self::from_metadata(&metadata, path))
    }

    /// Create a FileId from a path without keeping the file open.
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let metadata = fs::metadata(path)?;
        Ok(Self::from_metadata(&metadata, path))
    }

    pub fn dev(&self) -> u64 {
        self.dev
    }

    pub fn ino(&self) -> u64 {
        self.ino
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.dev, self.ino)
    }
}

/// Get the current path of an open file handle.
///
/// Used to report where a rotated file was renamed to. If the file was deleted
/// but the handle is still open, the kernel reports a "(deleted)" suffix.
#[cfg(target_os = "linux")]
pub fn get_path_from_file(file: &File) -> io::Result<PathBuf> {
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    let link_path = format!("/proc/self/fd/{}", fd);
    fs::read_link(&link_path)
}

/// Get the current path of an open file handle.
#[cfg(not(target_os = "linux"))]
pub fn get_path_from_file(_file: &File) -> io::Result<PathBuf> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "resolving a path from a file handle is not supported on this platform",
    ))
}
