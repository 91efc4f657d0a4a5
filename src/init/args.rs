// SPDX-License-Identifier: Apache-2.0

use clap::{Args, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::sources::file::config::{DEFAULT_MAX_READ_BYTES, FileSourceConfig, InitialPosition};

/// Where to start reading when there is no checkpoint for the file
#[derive(Copy, Clone, Debug, Default, ValueEnum, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StartAtArg {
    /// Start at the beginning of the file
    #[default]
    Beginning,
    /// Start at the end of the file (tail mode)
    End,
}

impl From<StartAtArg> for InitialPosition {
    fn from(s: StartAtArg) -> Self {
        match s {
            StartAtArg::Beginning => InitialPosition::Beginning,
            StartAtArg::End => InitialPosition::End,
        }
    }
}

/// How each record is decoded
#[derive(Copy, Clone, Debug, Default, ValueEnum, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecoderArg {
    /// UTF-8 text lines
    #[default]
    Text,
    /// One JSON document per line
    Json,
}

#[derive(Debug, Args, Clone)]
pub struct TailArgs {
    /// File to tail
    #[arg(long, env = "FILETAIL_FILE")]
    pub file: PathBuf,

    /// Path to store the last committed offset for resume after restarts
    #[arg(long, env = "FILETAIL_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// Delay in milliseconds between the end of one poll and the start of the next
    #[arg(long, env = "FILETAIL_POLL_INTERVAL_MS", default_value = "500")]
    pub poll_interval_ms: u64,

    /// Where to start reading when there is no checkpoint: beginning or end of file
    #[arg(value_enum, long, env = "FILETAIL_START_AT", default_value = "beginning")]
    pub start_at: StartAtArg,

    /// Record decoder: text or json
    #[arg(value_enum, long, env = "FILETAIL_DECODER", default_value = "text")]
    pub decoder: DecoderArg,

    /// Maximum bytes read from the file in one poll
    #[arg(long, env = "FILETAIL_MAX_READ_BYTES", default_value_t = DEFAULT_MAX_READ_BYTES)]
    pub max_read_bytes: usize,

    /// Source name reported with each record, defaults to the file path
    #[arg(long, env = "FILETAIL_NAME")]
    pub name: Option<String>,
}

impl From<&TailArgs> for FileSourceConfig {
    fn from(args: &TailArgs) -> Self {
        FileSourceConfig {
            source_file: args.file.clone(),
            state_file: args.state_file.clone(),
            interval: Duration::from_millis(args.poll_interval_ms),
            initial_position: args.start_at.into(),
            max_read_bytes: args.max_read_bytes,
            name: args.name.clone(),
        }
    }
}
