// SPDX-License-Identifier: Apache-2.0

//! The scheduling loop that drives a `TailCycle`.
//!
//! The loop runs on a tokio task. Each tick is moved onto the blocking pool,
//! and the next tick starts `interval` after the previous one finished.

use std::path::PathBuf;
use std::time::Duration;

use tokio::select;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::dispatcher::{self, Dispatch};
use tracing::instrument::WithSubscriber;
use tracing::{debug, error};

use crate::sources::file::cycle::TailCycle;
use crate::sources::file::decoder::Decoder;
use crate::sources::file::error::{Error, Result};

/// Lifecycle of a tailer. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailerState {
    Created,
    Running,
    Stopped,
}

pub struct Tailer<D: Decoder> {
    state: TailerState,
    path: PathBuf,
    interval: Duration,
    cycle: Option<TailCycle<D>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl<D: Decoder> Tailer<D> {
    pub fn new(cycle: TailCycle<D>, interval: Duration) -> Self {
        Self {
            state: TailerState::Created,
            path: cycle.state().path().to_path_buf(),
            interval,
            cycle: Some(cycle),
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    pub fn state(&self) -> TailerState {
        self.state
    }

    /// Spawn the loop onto the current tokio runtime.
    ///
    /// Returns once the loop is scheduled. The caller's tracing dispatcher is
    /// carried into the loop and every tick.
    pub fn start(&mut self) -> Result<()> {
        if self.state != TailerState::Created {
            return Err(Error::InvalidState(format!(
                "tailer can only be started once, it is {:?}",
                self.state
            )));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Config(format!("tailer must start inside a tokio runtime: {}", e)))?;
        let cycle = self
            .cycle
            .take()
            .ok_or_else(|| Error::InvalidState("tailer has no cycle to run".to_string()))?;

        let dispatch = dispatcher::get_default(|d| d.clone());
        let run = run_loop(
            cycle,
            self.interval,
            self.cancel.clone(),
            dispatch.clone(),
            self.path.clone(),
        );
        self.handle = Some(runtime.spawn(run.with_subscriber(dispatch)));
        self.state = TailerState::Running;

        debug!(path = ?self.path, interval = ?self.interval, "Tailer started");
        Ok(())
    }

    /// Stop the loop and wait for an in-flight tick to finish. Idempotent.
    pub async fn stop(&mut self) -> Result<()> {
        let previous = self.state;
        self.state = TailerState::Stopped;
        self.cancel.cancel();

        if previous != TailerState::Running {
            return Ok(());
        }

        match self.handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| Error::Task(format!("tailer loop failed: {}", e))),
            None => Ok(()),
        }
    }
}

impl<D: Decoder> Drop for Tailer<D> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_loop<D: Decoder>(
    mut cycle: TailCycle<D>,
    interval: Duration,
    cancel: CancellationToken,
    dispatch: Dispatch,
    path: PathBuf,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let tick_cancel = cancel.clone();
        let tick_dispatch = dispatch.clone();
        let result = tokio::task::spawn_blocking(move || {
            dispatcher::with_default(&tick_dispatch, || {
                cycle.run_once(&tick_cancel);
            });
            cycle
        })
        .await;

        cycle = match result {
            Ok(cycle) => cycle,
            Err(e) => {
                error!(path = ?path, error = %e, "Tail cycle task failed");
                return;
            }
        };

        select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    debug!(path = ?path, "Tailer stopped");
}
