// SPDX-License-Identifier: Apache-2.0

//! Configuration for a file source.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::sources::file::error::{Error, Result};

/// Default delay between the end of one poll and the start of the next
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// Default upper bound on bytes read from the live file per poll
pub const DEFAULT_MAX_READ_BYTES: usize = 8 * 1024 * 1024;

/// Where to start reading when there is no usable checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialPosition {
    /// Start at offset 0 so existing content is not skipped
    #[default]
    Beginning,
    /// Start at the current end of the file (only new content)
    End,
}

/// Configuration for a file source
#[derive(Debug, Clone)]
pub struct FileSourceConfig {
    /// File to tail
    pub source_file: PathBuf,
    /// Side file holding the last committed position; none disables persistence
    pub state_file: Option<PathBuf>,
    /// Delay between polls, measured from the end of one poll
    pub interval: Duration,
    /// Starting point when no checkpoint applies
    pub initial_position: InitialPosition,
    /// Maximum bytes read from the live file in one poll
    pub max_read_bytes: usize,
    /// Name reported to subscribers; defaults to the source path
    pub name: Option<String>,
}

impl Default for FileSourceConfig {
    fn default() -> Self {
        Self {
            source_file: PathBuf::new(),
            state_file: None,
            interval: DEFAULT_INTERVAL,
            initial_position: InitialPosition::Beginning,
            max_read_bytes: DEFAULT_MAX_READ_BYTES,
            name: None,
        }
    }
}

impl FileSourceConfig {
    pub fn new(source_file: impl Into<PathBuf>) -> Self {
        Self {
            source_file: source_file.into(),
            ..Default::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.source_file.as_os_str().is_empty() {
            return Err(Error::Config("source file must be specified".to_string()));
        }

        if self.interval.is_zero() {
            return Err(Error::Config("poll interval must be non-zero".to_string()));
        }

        if self.max_read_bytes == 0 {
            return Err(Error::Config("max read bytes must be non-zero".to_string()));
        }

        if let Some(state_file) = &self.state_file {
            if state_file.as_os_str().is_empty() {
                return Err(Error::Config("state file path is empty".to_string()));
            }
            if *state_file == self.source_file {
                return Err(Error::Config(
                    "state file must differ from the source file".to_string(),
                ));
            }
        }

        if matches!(&self.name, Some(name) if name.is_empty()) {
            return Err(Error::Config("source name is empty".to_string()));
        }

        Ok(())
    }

    /// Name subscribers see for this source
    pub fn source_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.source_file.display().to_string(),
        }
    }
}
