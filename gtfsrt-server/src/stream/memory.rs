//! In-memory stream backend.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use super::{MessageStream, StreamCursor, StreamEntry, StreamError, parse_stream_id};

/// Append-only in-memory [`MessageStream`], used by tests and by the
/// fixture replay loader.
#[derive(Debug, Default)]
pub struct InMemoryStream {
    entries: Mutex<Vec<StreamEntry>>,
    next_seq: AtomicU64,
}

impl InMemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry with a generated id and returns that id.
    pub async fn append(&self, fields: Vec<(String, Vec<u8>)>) -> String {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("{seq}-0");
        let mut entries = self.entries.lock().await;
        entries.push(StreamEntry {
            id: id.clone(),
            fields,
        });
        id
    }
}

impl MessageStream for InMemoryStream {
    async fn read_batch(
        &self,
        cursor: &StreamCursor,
        max_count: usize,
    ) -> Result<Vec<StreamEntry>, StreamError> {
        let floor = parse_stream_id(cursor.as_str()).ok_or_else(|| StreamError::BadCursor {
            cursor: cursor.as_str().to_string(),
        })?;
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|entry| parse_stream_id(&entry.id).is_some_and(|id| id > floor))
            .take(max_count)
            .cloned()
            .collect())
    }

    async fn last_id(&self) -> Result<StreamCursor, StreamError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .last()
            .map(|entry| StreamCursor::new(entry.id.clone()))
            .unwrap_or_else(|| StreamCursor::new("0")))
    }
}
