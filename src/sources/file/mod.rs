// SPDX-License-Identifier: Apache-2.0

//! File source for tailing a single growing file.
//!
//! The source polls one path on a fixed delay, reads appended bytes, splits
//! them into newline-terminated records, decodes each record and notifies the
//! attached subscribers.
//!
//! Features:
//! - Device/inode tracking to tell renames from in-place truncation
//! - Draining of the previous file after a rename rotation
//! - Durable checkpoints for resume after restarts

pub mod config;
pub mod cycle;
pub mod decoder;
pub mod dispatch;
pub mod error;
pub mod file_id;
pub mod persistence;
pub mod rotation;
pub mod source;
pub mod splitter;
pub mod tailer;

pub use config::{FileSourceConfig, InitialPosition};
pub use cycle::{TailCycle, TailState};
pub use decoder::{Decoder, JsonDecoder, TextDecoder};
pub use dispatch::{DispatchOutcome, RecordDispatcher, SourceId, Subscriber};
pub use error::{DecodeError, Error, Result};
pub use file_id::FileId;
pub use persistence::{JsonFilePositionStore, MemoryPositionStore, PersistedPosition, PositionStore};
pub use rotation::{Observation, RotationClass, RotationDetector};
pub use source::{FileSource, FileSourceBuilder};
pub use splitter::RecordSplitter;
pub use tailer::{Tailer, TailerState};
