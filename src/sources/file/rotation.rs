// SPDX-License-Identifier: Apache-2.0

//! Rotation detection.
//!
//! Identity is the primary rotation signal: a path that now denotes a different
//! file was rotated by rename, even if the sizes happen to line up. Size only
//! decides between growth and in-place truncation of the same file.

use std::fs;
use std::io;
use std::path::Path;

use crate::sources::file::file_id::FileId;

/// What happened to the watched path since the previous poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationClass {
    /// Same file, nothing new to read
    Unchanged,
    /// Same file (or first sighting), bytes past the offset are available
    Grown,
    /// The path now denotes a different file than before
    RotatedRename,
    /// Same file, but it shrank: truncated in place
    RotatedTruncate,
    /// Nothing exists at the path
    Missing,
}

/// What the path resolved to during one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub file_id: FileId,
    pub size: u64,
}

impl Observation {
    pub fn new(file_id: FileId, size: u64) -> Self {
        Self { file_id, size }
    }

    /// Resolve `path`. `Ok(None)` means nothing exists there.
    pub fn probe(path: &Path) -> io::Result<Option<Self>> {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        Ok(Some(Self {
            file_id: FileId::from_metadata(&metadata, path),
            size: metadata.len(),
        }))
    }
}

/// Classifies each poll of a path against what the tailer last knew about it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RotationDetector;

impl RotationDetector {
    pub fn new() -> Self {
        Self
    }

    /// `previous` is the identity and size seen on the last poll (None before
    /// the first sighting); `offset` is the tailer's read position.
    pub fn classify(
        &self,
        previous: Option<Observation>,
        offset: u64,
        current: Option<Observation>,
    ) -> RotationClass {
        let Some(current) = current else {
            return RotationClass::Missing;
        };

        let Some(previous) = previous else {
            return if current.size > offset {
                RotationClass::Grown
            } else {
                RotationClass::Unchanged
            };
        };

        if current.file_id != previous.file_id {
            return RotationClass::RotatedRename;
        }

        if current.size < previous.size || current.size < offset {
            RotationClass::RotatedTruncate
        } else if current.size > offset {
            RotationClass::Grown
        } else {
            RotationClass::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID_A: FileId = FileId::new(1, 100);
    const ID_B: FileId = FileId::new(1, 200);

    fn obs(file_id: FileId, size: u64) -> Option<Observation> {
        Some(Observation::new(file_id, size))
    }

    #[test]
    fn test_missing_path() {
        let detector = RotationDetector::new();
        assert_eq!(
            detector.classify(obs(ID_A, 10), 10, None),
            RotationClass::Missing
        );
        assert_eq!(detector.classify(None, 0, None), RotationClass::Missing);
    }

    #[test]
    fn test_first_sighting() {
        let detector = RotationDetector::new();
        assert_eq!(
            detector.classify(None, 0, obs(ID_A, 5)),
            RotationClass::Grown
        );
        assert_eq!(
            detector.classify(None, 0, obs(ID_A, 0)),
            RotationClass::Unchanged
        );
    }

    #[test]
    fn test_same_identity_growth() {
        let detector = RotationDetector::new();
        assert_eq!(
            detector.classify(obs(ID_A, 10), 10, obs(ID_A, 25)),
            RotationClass::Grown
        );
        assert_eq!(
            detector.classify(obs(ID_A, 10), 10, obs(ID_A, 10)),
            RotationClass::Unchanged
        );
    }

    #[test]
    fn test_same_identity_shrink_below_offset() {
        let detector = RotationDetector::new();
        assert_eq!(
            detector.classify(obs(ID_A, 30), 30, obs(ID_A, 16)),
            RotationClass::RotatedTruncate
        );
        assert_eq!(
            detector.classify(obs(ID_A, 30), 30, obs(ID_A, 0)),
            RotationClass::RotatedTruncate
        );
    }

    #[test]
    fn test_same_identity_shrink_still_above_offset_is_truncate() {
        let detector = RotationDetector::new();
        // Offset lags behind the last observed size; the file shrank but is
        // still longer than the offset.
        assert_eq!(
            detector.classify(obs(ID_A, 100), 20, obs(ID_A, 50)),
            RotationClass::RotatedTruncate
        );
    }

    #[test]
    fn test_checkpoint_beyond_size_is_truncate() {
        let detector = RotationDetector::new();
        assert_eq!(
            detector.classify(obs(ID_A, 100), 100, obs(ID_A, 100)),
            RotationClass::Unchanged
        );
        assert_eq!(
            detector.classify(obs(ID_A, 40), 100, obs(ID_A, 40)),
            RotationClass::RotatedTruncate
        );
    }

    #[test]
    fn test_identity_change_wins_over_size() {
        let detector = RotationDetector::new();
        assert_eq!(
            detector.classify(obs(ID_A, 10), 10, obs(ID_B, 50)),
            RotationClass::RotatedRename
        );
        assert_eq!(
            detector.classify(obs(ID_A, 10), 10, obs(ID_B, 10)),
            RotationClass::RotatedRename
        );
    }

    #[test]
    fn test_empty_to_empty_rename_is_detected() {
        let detector = RotationDetector::new();
        assert_eq!(
            detector.classify(obs(ID_A, 0), 0, obs(ID_B, 0)),
            RotationClass::RotatedRename
        );
    }

    #[test]
    fn test_probe_missing_and_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");

        assert!(Observation::probe(&path).unwrap().is_none());

        fs::write(&path, b"hello\n").unwrap();
        let observed = Observation::probe(&path).unwrap().unwrap();
        assert_eq!(observed.size, 6);
        assert_eq!(observed.file_id, FileId::from_path(&path).unwrap());
    }

    #[test]
    fn test_probe_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Observation::probe(dir.path()).is_err());
    }
}
