// SPDX-License-Identifier: Apache-2.0

//! Splits appended bytes into delimiter-terminated records.

use bytes::{Bytes, BytesMut};

/// Record delimiter used by the tailer
pub const NEWLINE: u8 = b'\n';

/// Turns byte deltas into complete records.
///
/// The splitter keeps no state of its own: bytes after the last delimiter stay
/// in the caller's pending buffer and are prepended to the next `feed`. It never
/// fails; malformed input only produces long or empty records.
#[derive(Debug, Clone, Copy)]
pub struct RecordSplitter {
    delimiter: u8,
}

impl Default for RecordSplitter {
    fn default() -> Self {
        Self::new(NEWLINE)
    }
}

impl RecordSplitter {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }

    /// Append `input` to `pending` and return every record it completes.
    ///
    /// Records exclude the delimiter. Whatever follows the last delimiter is
    /// left in `pending`.
    pub fn feed(&self, pending: &mut BytesMut, input: &[u8]) -> Vec<Bytes> {
        if input.is_empty() {
            return Vec::new();
        }

        // Only the new bytes can contain a delimiter we have not seen yet
        let search_from = pending.len();
        pending.extend_from_slice(input);

        let mut records = Vec::new();
        let mut start = 0;
        let mut consumed = 0;
        for (i, byte) in pending[search_from..].iter().enumerate() {
            if *byte == self.delimiter {
                let end = search_from + i;
                records.push((start, end));
                start = end + 1;
                consumed = start;
            }
        }

        if consumed == 0 {
            return Vec::new();
        }

        let complete = pending.split_to(consumed).freeze();
        records
            .into_iter()
            .map(|(s, e)| complete.slice(s..e))
            .collect()
    }

    /// Number of bytes a record occupied in the file, delimiter included.
    pub fn encoded_len(record: &[u8]) -> u64 {
        record.len() as u64 + 1
    }
}
