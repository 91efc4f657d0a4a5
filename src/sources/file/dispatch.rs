// SPDX-License-Identifier: Apache-2.0

//! Decoder dispatch and subscriber fan-out for a batch of records.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::sources::file::decoder::Decoder;
use crate::sources::file::splitter::RecordSplitter;

/// Name of a source as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceId(Arc<str>);

impl SourceId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for SourceId {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Receives every successfully decoded record of a source.
///
/// Called synchronously on the tailer's thread; a slow subscriber delays the
/// next poll. Panics are caught and logged, and do not prevent the remaining
/// subscribers from being notified.
pub trait Subscriber<T>: Send + Sync + 'static {
    fn notify(&self, source: &SourceId, value: &T);
}

impl<T, F> Subscriber<T> for F
where
    F: Fn(&SourceId, &T) + Send + Sync + 'static,
{
    fn notify(&self, source: &SourceId, value: &T) {
        self(source, value)
    }
}

pub type BoxedSubscriber<T> = Box<dyn Subscriber<T>>;

/// Result of dispatching one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Records taken from the front of the batch, decoded or not
    pub consumed: usize,
    /// File bytes covered by the consumed records, delimiters included
    pub consumed_bytes: u64,
    /// Records delivered to subscribers
    pub delivered: usize,
    /// Records dropped because they failed to decode
    pub decode_failures: usize,
}

impl DispatchOutcome {
    pub fn is_complete(&self, batch_len: usize) -> bool {
        self.consumed == batch_len
    }
}

pub struct RecordDispatcher<D: Decoder> {
    source: SourceId,
    decoder: D,
    subscribers: Vec<BoxedSubscriber<D::Output>>,
}

impl<D: Decoder> RecordDispatcher<D> {
    pub fn new(source: SourceId, decoder: D, subscribers: Vec<BoxedSubscriber<D::Output>>) -> Self {
        Self {
            source,
            decoder,
            subscribers,
        }
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    /// Decode and deliver `records` in order.
    ///
    /// Cancellation is checked before each record; a record that has started
    /// dispatching is always delivered to every subscriber. Records after the
    /// cancellation point are left unconsumed.
    pub fn dispatch(&self, records: &[Bytes], cancel: &CancellationToken) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        for record in records {
            if cancel.is_cancelled() {
                break;
            }

            outcome.consumed += 1;
            outcome.consumed_bytes += RecordSplitter::encoded_len(record);

            match self.decode(record) {
                Some(value) => {
                    self.notify_all(&value);
                    outcome.delivered += 1;
                }
                None => outcome.decode_failures += 1,
            }
        }

        outcome
    }

    fn decode(&self, record: &[u8]) -> Option<D::Output> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.decoder.decode(record))) {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(
                    source = %self.source,
                    record_len = record.len(),
                    error = %e,
                    "Failed to decode record"
                );
                None
            }
            Err(_) => {
                warn!(
                    source = %self.source,
                    record_len = record.len(),
                    error = "decoder panicked",
                    "Failed to decode record"
                );
                None
            }
        }
    }

    fn notify_all(&self, value: &D::Output) {
        for (index, subscriber) in self.subscribers.iter().enumerate() {
            let result =
                panic::catch_unwind(AssertUnwindSafe(|| subscriber.notify(&self.source, value)));
            if let Err(payload) = result {
                error!(
                    source = %self.source,
                    subscriber = index,
                    panic = panic_message(payload.as_ref()),
                    "Subscriber panicked during notify"
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
