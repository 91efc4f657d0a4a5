// SPDX-License-Identifier: Apache-2.0

//! Public entry point: a configured file source with its subscribers.

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::sources::file::config::{FileSourceConfig, InitialPosition};
use crate::sources::file::cycle::TailCycle;
use crate::sources::file::decoder::Decoder;
use crate::sources::file::dispatch::{BoxedSubscriber, RecordDispatcher, SourceId, Subscriber};
use crate::sources::file::error::{Error, Result};
use crate::sources::file::persistence::PositionStore;
use crate::sources::file::tailer::{Tailer, TailerState};

/// Tails one file, decodes each record with `D` and notifies subscribers.
///
/// Subscribers are attached before `start`. Dropping a running source cancels
/// its loop without waiting for it; call `stop` to wait.
pub struct FileSource<D: Decoder> {
    config: FileSourceConfig,
    source_id: SourceId,
    decoder: Option<D>,
    subscribers: Vec<BoxedSubscriber<D::Output>>,
    store: Option<Box<dyn PositionStore>>,
    tailer: Option<Tailer<D>>,
    stopped: bool,
}

impl<D: Decoder> FileSource<D> {
    pub fn new(config: FileSourceConfig, decoder: D) -> Result<Self> {
        FileSourceBuilder::from_config(config).decoder(decoder).build()
    }

    pub fn builder(source_file: impl Into<PathBuf>) -> FileSourceBuilder<D> {
        FileSourceBuilder::new(source_file)
    }

    pub fn config(&self) -> &FileSourceConfig {
        &self.config
    }

    pub fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    pub fn state(&self) -> TailerState {
        match &self.tailer {
            Some(tailer) => tailer.state(),
            None if self.stopped => TailerState::Stopped,
            None => TailerState::Created,
        }
    }

    /// Register a subscriber. Subscribers are notified in registration order.
    pub fn attach(&mut self, subscriber: impl Subscriber<D::Output>) -> Result<()> {
        if self.state() != TailerState::Created {
            return Err(Error::InvalidState(
                "subscribers must be attached before the source starts".to_string(),
            ));
        }
        self.subscribers.push(Box::new(subscriber));
        Ok(())
    }

    /// Start tailing on the current tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.state() != TailerState::Created {
            return Err(Error::InvalidState(format!(
                "source can only be started once, it is {:?}",
                self.state()
            )));
        }
        self.config.validate()?;
        tokio::runtime::Handle::try_current().map_err(|e| {
            Error::Config(format!("file source must start inside a tokio runtime: {}", e))
        })?;

        let decoder = self
            .decoder
            .take()
            .ok_or_else(|| Error::Config("no decoder bound".to_string()))?;

        info!(
            path = ?self.config.source_file,
            state_file = ?self.config.state_file,
            interval = ?self.config.interval,
            initial_position = ?self.config.initial_position,
            subscribers = self.subscribers.len(),
            "Starting file source"
        );

        let dispatcher = RecordDispatcher::new(
            self.source_id.clone(),
            decoder,
            std::mem::take(&mut self.subscribers),
        );
        let cycle = TailCycle::new(&self.config, dispatcher, self.store.take());
        let mut tailer = Tailer::new(cycle, self.config.interval);
        tailer.start()?;
        self.tailer = Some(tailer);
        Ok(())
    }

    /// Stop tailing and wait for the loop to exit. Idempotent.
    pub async fn stop(&mut self) -> Result<()> {
        self.stopped = true;
        match self.tailer.as_mut() {
            Some(tailer) => tailer.stop().await,
            None => Ok(()),
        }
    }
}

/// Builds a validated `FileSource`.
pub struct FileSourceBuilder<D: Decoder> {
    config: FileSourceConfig,
    decoder: Option<D>,
    store: Option<Box<dyn PositionStore>>,
}

impl<D: Decoder> FileSourceBuilder<D> {
    pub fn new(source_file: impl Into<PathBuf>) -> Self {
        Self::from_config(FileSourceConfig::new(source_file))
    }

    pub fn from_config(config: FileSourceConfig) -> Self {
        Self {
            config,
            decoder: None,
            store: None,
        }
    }

    pub fn state_file(mut self, state_file: impl Into<PathBuf>) -> Self {
        self.config.state_file = Some(state_file.into());
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn initial_position(mut self, initial_position: InitialPosition) -> Self {
        self.config.initial_position = initial_position;
        self
    }

    pub fn max_read_bytes(mut self, max_read_bytes: usize) -> Self {
        self.config.max_read_bytes = max_read_bytes;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    pub fn decoder(mut self, decoder: D) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Use `store` for checkpoints instead of a state file.
    pub fn position_store(mut self, store: impl PositionStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn build(self) -> Result<FileSource<D>> {
        self.config.validate()?;
        let decoder = self
            .decoder
            .ok_or_else(|| Error::Config("a decoder must be bound".to_string()))?;

        Ok(FileSource {
            source_id: SourceId::new(self.config.source_name()),
            config: self.config,
            decoder: Some(decoder),
            subscribers: Vec::new(),
            store: self.store,
            tailer: None,
            stopped: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::file::decoder::{JsonDecoder, TextDecoder};

    #[test]
    fn test_build_requires_decoder() {
        let result = FileSourceBuilder::<TextDecoder>::new("/var/log/app.log").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_build_validates_config() {
        let result = FileSource::builder("/var/log/app.log")
            .interval(Duration::ZERO)
            .decoder(TextDecoder)
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_sets_fields() {
        let source = FileSource::builder("/var/log/app.log")
            .state_file("/var/lib/filetail/state.json")
            .interval(Duration::from_millis(100))
            .initial_position(InitialPosition::End)
            .max_read_bytes(1024)
            .name("app")
            .decoder(JsonDecoder)
            .build()
            .unwrap();

        let config = source.config();
        assert_eq!(
            config.state_file,
            Some(PathBuf::from("/var/lib/filetail/state.json"))
        );
        assert_eq!(config.interval, Duration::from_millis(100));
        assert_eq!(config.initial_position, InitialPosition::End);
        assert_eq!(config.max_read_bytes, 1024);
        assert_eq!(source.source_id().as_str(), "app");
        assert_eq!(source.state(), TailerState::Created);
    }

    #[test]
    fn test_source_id_defaults_to_path() {
        let source = FileSource::new(FileSourceConfig::new("/var/log/app.log"), TextDecoder).unwrap();
        assert_eq!(source.source_id().as_str(), "/var/log/app.log");
    }

    #[test]
    fn test_start_outside_runtime_is_rejected() {
        let mut source =
            FileSource::new(FileSourceConfig::new("/var/log/app.log"), TextDecoder).unwrap();
        assert!(matches!(source.start(), Err(Error::Config(_))));
        // Nothing was consumed, so the source can still start later
        assert_eq!(source.state(), TailerState::Created);
    }

    #[tokio::test]
    async fn test_attach_after_start_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut source =
            FileSource::new(FileSourceConfig::new(dir.path().join("app.log")), TextDecoder)
                .unwrap();
        source.attach(|_: &SourceId, _: &String| {}).unwrap();
        source.start().unwrap();

        let late = source.attach(|_: &SourceId, _: &String| {});
        assert!(matches!(late, Err(Error::InvalidState(_))));
        assert!(matches!(source.start(), Err(Error::InvalidState(_))));

        source.stop().await.unwrap();
        source.stop().await.unwrap();
        assert_eq!(source.state(), TailerState::Stopped);
    }
}
