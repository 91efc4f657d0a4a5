// SPDX-License-Identifier: Apache-2.0

use crate::sources::file::error::DecodeError;

/// Converts one raw record into a typed value.
///
/// Decoders are called on the tailer's blocking thread, once per record, and
/// must not depend on side effects for the engine's correctness. A failure
/// drops only the record that produced it.
pub trait Decoder: Send + Sync + 'static {
    type Output: Send + 'static;

    fn decode(&self, record: &[u8]) -> Result<Self::Output, DecodeError>;
}

impl<F, T> Decoder for F
where
    F: Fn(&[u8]) -> Result<T, DecodeError> + Send + Sync + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn decode(&self, record: &[u8]) -> Result<T, DecodeError> {
        self(record)
    }
}

/// Decodes records as UTF-8 text, dropping a trailing carriage return.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDecoder;

impl Decoder for TextDecoder {
    type Output = String;

    fn decode(&self, record: &[u8]) -> Result<String, DecodeError> {
        let record = record.strip_suffix(b"\r").unwrap_or(record);
        Ok(std::str::from_utf8(record)?.to_owned())
    }
}

/// Decodes each record as one JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    type Output = serde_json::Value;

    fn decode(&self, record: &[u8]) -> Result<serde_json::Value, DecodeError> {
        if record.iter().all(u8::is_ascii_whitespace) {
            return Err(DecodeError::Invalid("empty record".to_string()));
        }
        Ok(serde_json::from_slice(record)?)
    }
}
