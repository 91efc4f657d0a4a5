// SPDX-License-Identifier: Apache-2.0

//! One poll of a tailed file.
//!
//! A `TailCycle` owns the per-source `TailState` and is driven by the tailer
//! loop, one `run_once` per tick. Each tick classifies the path, reads what is
//! new (draining the previous file first after a rename), dispatches complete
//! records and then commits the position of the last complete record.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::sources::file::config::{FileSourceConfig, InitialPosition};
use crate::sources::file::decoder::Decoder;
use crate::sources::file::dispatch::RecordDispatcher;
use crate::sources::file::error::Result;
use crate::sources::file::file_id::{FileId, get_path_from_file};
use crate::sources::file::persistence::{JsonFilePositionStore, PositionStore};
use crate::sources::file::rotation::{Observation, RotationClass, RotationDetector};
use crate::sources::file::splitter::RecordSplitter;

/// In-memory state of one tailed path
#[derive(Debug)]
pub struct TailState {
    path: PathBuf,
    /// File currently being tailed; None until a file was seen at the path
    identity: Option<FileId>,
    /// Open handle to `identity`, kept so the file stays readable after a rename
    file: Option<File>,
    /// Size of `identity` at the last poll
    size: u64,
    /// Read position in `identity`
    offset: u64,
    /// Bytes read past the last delimiter
    partial_tail: BytesMut,
    missing_warned: bool,
    last_committed: Option<(FileId, u64)>,
}

impl TailState {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            identity: None,
            file: None,
            size: 0,
            offset: 0,
            partial_tail: BytesMut::new(),
            missing_warned: false,
            last_committed: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn identity(&self) -> Option<FileId> {
        self.identity
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn partial_tail(&self) -> &[u8] {
        &self.partial_tail
    }

    pub fn missing_warned(&self) -> bool {
        self.missing_warned
    }

    /// End of the last complete record, the position that is safe to persist
    pub fn committable_offset(&self) -> u64 {
        self.offset - self.partial_tail.len() as u64
    }

    pub fn last_committed(&self) -> Option<(FileId, u64)> {
        self.last_committed
    }
}

pub struct TailCycle<D: Decoder> {
    state: TailState,
    detector: RotationDetector,
    splitter: RecordSplitter,
    dispatcher: RecordDispatcher<D>,
    store: Option<Box<dyn PositionStore>>,
    state_file: Option<PathBuf>,
    initial_position: InitialPosition,
    max_read_bytes: u64,
    bootstrapped: bool,
}

impl<D: Decoder> TailCycle<D> {
    /// Create a cycle for `config`. No I/O happens until the first `run_once`.
    ///
    /// `store` takes precedence over `config.state_file`.
    pub fn new(
        config: &FileSourceConfig,
        dispatcher: RecordDispatcher<D>,
        store: Option<Box<dyn PositionStore>>,
    ) -> Self {
        Self {
            state: TailState::new(config.source_file.clone()),
            detector: RotationDetector::new(),
            splitter: RecordSplitter::default(),
            dispatcher,
            store,
            state_file: config.state_file.clone(),
            initial_position: config.initial_position,
            max_read_bytes: config.max_read_bytes as u64,
            bootstrapped: false,
        }
    }

    pub fn state(&self) -> &TailState {
        &self.state
    }

    /// Run one poll. Returns the classification of the path, or None when the
    /// tick was aborted by an I/O error and will be retried.
    pub fn run_once(&mut self, cancel: &CancellationToken) -> Option<RotationClass> {
        if !self.bootstrapped {
            if let Err(e) = self.bootstrap() {
                warn!(path = ?self.state.path, error = %e, "Failed to read file");
                return None;
            }
            self.bootstrapped = true;
        }

        match self.tick(cancel) {
            Ok(class) => {
                self.commit_position();
                Some(class)
            }
            Err(e) => {
                warn!(
                    path = ?self.state.path,
                    offset = self.state.offset,
                    error = %e,
                    "Failed to read file"
                );
                None
            }
        }
    }

    /// Load the checkpoint and resolve the starting position.
    fn bootstrap(&mut self) -> Result<()> {
        if self.store.is_none() {
            if let Some(state_file) = &self.state_file {
                let store = match JsonFilePositionStore::open(state_file) {
                    Ok(store) => store,
                    Err(e) => {
                        warn!(
                            state_file = ?state_file,
                            error = %e,
                            "Failed to load positions, starting without checkpoints"
                        );
                        JsonFilePositionStore::empty(state_file.clone())
                    }
                };
                self.store = Some(Box::new(store));
            }
        }

        let Some((file, file_id, size)) = open_regular(&self.state.path)? else {
            // Everything written to it once it appears is new
            debug!(path = ?self.state.path, "Tailer file missing at start");
            return Ok(());
        };

        let checkpoint = match &self.store {
            Some(store) => match store.load(&self.state.path) {
                Ok(checkpoint) => checkpoint,
                Err(e) => {
                    warn!(path = ?self.state.path, error = %e, "Failed to load position");
                    None
                }
            },
            None => None,
        };

        let offset = match checkpoint {
            Some(position) if position.matches(&file_id) => {
                self.state.last_committed = Some((file_id, position.offset));
                position.offset
            }
            other => {
                if let Some(position) = other {
                    debug!(
                        path = ?self.state.path,
                        checkpoint_file_id = %position.file_id(),
                        %file_id,
                        "Ignoring checkpoint taken from a different file"
                    );
                }
                match self.initial_position {
                    InitialPosition::Beginning => 0,
                    InitialPosition::End => size,
                }
            }
        };

        debug!(
            path = ?self.state.path,
            %file_id,
            offset,
            size,
            "Tailer starting"
        );

        self.state.file = Some(file);
        self.state.identity = Some(file_id);
        self.state.size = size;
        self.state.offset = offset;
        Ok(())
    }

    fn tick(&mut self, cancel: &CancellationToken) -> Result<RotationClass> {
        let current = Observation::probe(&self.state.path)?;
        let previous = self
            .state
            .identity
            .map(|file_id| Observation::new(file_id, self.state.size));
        let class = self.detector.classify(previous, self.state.offset, current);

        let Some(current) = current else {
            self.on_missing();
            return Ok(class);
        };
        self.on_found();

        match class {
            RotationClass::Grown | RotationClass::Unchanged if self.state.identity.is_none() => {
                // First sighting of a file that was missing at start
                if self.adopt()? {
                    self.state.offset = 0;
                    self.read_live(cancel)?;
                }
            }
            RotationClass::Grown => {
                self.state.size = current.size;
                self.read_live(cancel)?;
            }
            RotationClass::RotatedRename => self.on_rename(current, cancel)?,
            RotationClass::RotatedTruncate => self.on_truncate(current, cancel)?,
            RotationClass::Unchanged | RotationClass::Missing => {}
        }

        Ok(class)
    }

    fn on_missing(&mut self) {
        if !self.state.missing_warned {
            warn!(path = ?self.state.path, "Tailer file not found");
            self.state.missing_warned = true;
        }
    }

    fn on_found(&mut self) {
        if self.state.missing_warned {
            debug!(path = ?self.state.path, "Tailer file found");
            self.state.missing_warned = false;
        }
    }

    /// Drain what is left of the previous file, then switch to the new one.
    fn on_rename(&mut self, current: Observation, cancel: &CancellationToken) -> Result<()> {
        let old_file_id = self.state.identity;
        let drained = self.drain_previous(cancel)?;
        if cancel.is_cancelled() {
            return Ok(());
        }

        let rotated_to = self
            .state
            .file
            .as_ref()
            .and_then(|file| get_path_from_file(file).ok());
        // An unterminated record is never decoded; the old file is not read again
        let discarded = self.state.partial_tail.len();

        if drained > 0 || discarded > 0 {
            info!(
                path = ?self.state.path,
                rotated_to = ?rotated_to,
                old_file_id = ?old_file_id,
                new_file_id = %current.file_id,
                drained_bytes = drained,
                discarded_bytes = discarded,
                "Tailer file rotate"
            );
        } else {
            debug!(
                path = ?self.state.path,
                rotated_to = ?rotated_to,
                old_file_id = ?old_file_id,
                new_file_id = %current.file_id,
                "Tailer file rotate"
            );
        }

        self.state.file = None;
        self.state.identity = None;
        self.state.partial_tail.clear();
        self.state.size = 0;
        self.state.offset = 0;

        if !self.adopt()? {
            // Gone again before it could be opened; picked up as a new file later
            return Ok(());
        }

        self.state.offset = match self.initial_position {
            InitialPosition::Beginning => 0,
            InitialPosition::End => self.state.size,
        };
        self.read_live(cancel)
    }

    fn on_truncate(&mut self, current: Observation, cancel: &CancellationToken) -> Result<()> {
        info!(
            path = ?self.state.path,
            file_id = %current.file_id,
            offset = self.state.offset,
            previous_size = self.state.size,
            size = current.size,
            lost_bytes = self.state.size.saturating_sub(self.state.offset),
            "Tailer file rotate"
        );

        self.state.offset = 0;
        self.state.partial_tail.clear();
        self.state.size = current.size;
        self.read_live(cancel)
    }

    /// Open whatever file is at the path now and make it the tailed file.
    /// Returns false if nothing is there anymore.
    fn adopt(&mut self) -> Result<bool> {
        // Identity comes from the handle; the path may have changed since the probe
        let Some((file, file_id, size)) = open_regular(&self.state.path)? else {
            return Ok(false);
        };

        self.state.file = Some(file);
        self.state.identity = Some(file_id);
        self.state.size = size;
        self.state.partial_tail.clear();
        Ok(true)
    }

    /// Read up to `max_read_bytes` of new content from the tailed file.
    fn read_live(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.state.size <= self.state.offset {
            return Ok(());
        }
        let Some(file) = self.state.file.as_mut() else {
            return Ok(());
        };

        let limit = (self.state.size - self.state.offset).min(self.max_read_bytes);
        let buf = read_at(file, self.state.offset, limit)?;
        self.deliver(&buf, cancel);
        Ok(())
    }

    /// Read the previous file to its end. Returns the number of bytes drained.
    fn drain_previous(&mut self, cancel: &CancellationToken) -> Result<u64> {
        let mut drained = 0;

        loop {
            let Some(file) = self.state.file.as_mut() else {
                break;
            };
            let buf = read_at(file, self.state.offset, self.max_read_bytes)?;
            if buf.is_empty() {
                break;
            }
            drained += buf.len() as u64;
            self.deliver(&buf, cancel);
            if cancel.is_cancelled() {
                break;
            }
        }

        Ok(drained)
    }

    /// Split, dispatch and account for `buf`, read at the current offset.
    fn deliver(&mut self, buf: &[u8], cancel: &CancellationToken) {
        let base = self.state.committable_offset();
        let records = self.splitter.feed(&mut self.state.partial_tail, buf);
        self.state.offset += buf.len() as u64;

        let outcome = self.dispatcher.dispatch(&records, cancel);
        if !outcome.is_complete(records.len()) {
            // Stopped mid-batch: resume after the last dispatched record
            self.state.offset = base + outcome.consumed_bytes;
            self.state.partial_tail.clear();
        }
    }

    /// Persist the position of the last complete record if it moved.
    ///
    /// A failed commit leaves `last_committed` untouched, so the next tick
    /// tries again.
    fn commit_position(&mut self) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        let Some(file_id) = self.state.identity else {
            return;
        };

        let offset = self.state.committable_offset();
        if self.state.last_committed == Some((file_id, offset)) {
            return;
        }

        match store.commit(&self.state.path, file_id, offset) {
            Ok(()) => self.state.last_committed = Some((file_id, offset)),
            Err(e) => warn!(
                path = ?self.state.path,
                %file_id,
                offset,
                error = %e,
                "Failed to commit position"
            ),
        }
    }
}

/// Open `path` with its identity and size. None if nothing is there.
fn open_regular(path: &Path) -> io::Result<Option<(File, FileId, u64)>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let metadata = file.metadata()?;
    if !metadata.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a regular file", path.display()),
        ));
    }

    let file_id = FileId::from_file(&file, path)?;
    Ok(Some((file, file_id, metadata.len())))
}

fn read_at(file: &mut File, offset: u64, limit: u64) -> io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::new();
    file.by_ref().take(limit).read_to_end(&mut buf)?;
    Ok(buf)
}
