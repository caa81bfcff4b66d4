//! Ordered message streams and their consumption.
//!
//! Realtime messages arrive on append-only streams whose entries carry a
//! monotonically increasing id of the form `<millis>-<seq>`. Consumers
//! poll in batches from a cursor position and persist the cursor once a
//! batch has been fully handled, giving at-least-once delivery.

pub mod consumer;
pub mod cursor;
pub mod memory;

pub use consumer::{
    ConsumerConfig, ConsumerError, DecodeFailure, ResumeError, resolve_resume_position, run,
};
pub use cursor::{CursorError, CursorStore, FileCursorStore, KvCursorStore};
pub use memory::InMemoryStream;

use std::future::Future;

/// Position in a stream.
///
/// The special cursor `$` stands for "the latest entry at the time of
/// subscribing" and must be resolved to a concrete id before reading.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamCursor(String);

impl StreamCursor {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn latest() -> Self {
        Self("$".to_string())
    }

    pub fn is_latest(&self) -> bool {
        self.0 == "$"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry read from a stream: the id plus the raw field list.
///
/// Fields are positional; the names that travel with them are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: Vec<(String, Vec<u8>)>,
}

impl StreamEntry {
    /// Value bytes of the field at `index`.
    pub fn value_at(&self, index: usize) -> Option<&[u8]> {
        self.fields.get(index).map(|(_, value)| value.as_slice())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The cursor cannot be used to read, e.g. an unresolved `$`.
    #[error("invalid stream cursor `{cursor}`")]
    BadCursor { cursor: String },
    /// The stream backend failed.
    #[error("stream transport failed: {reason}")]
    Transport { reason: String },
}

/// Splits a stream id into its numeric parts for ordering. A bare number
/// is read as `<n>-0`.
pub fn parse_stream_id(id: &str) -> Option<(u64, u64)> {
    match id.split_once('-') {
        Some((millis, seq)) => Some((millis.parse().ok()?, seq.parse().ok()?)),
        None => Some((id.parse().ok()?, 0)),
    }
}

pub trait MessageStream: Send + Sync {
    /// Reads up to `max_count` entries with ids strictly greater than
    /// `cursor`, without blocking when none exist.
    fn read_batch(
        &self,
        cursor: &StreamCursor,
        max_count: usize,
    ) -> impl Future<Output = Result<Vec<StreamEntry>, StreamError>> + Send;

    /// Id of the most recently appended entry, or a cursor before the
    /// first entry when the stream is empty.
    fn last_id(&self) -> impl Future<Output = Result<StreamCursor, StreamError>> + Send;
}
