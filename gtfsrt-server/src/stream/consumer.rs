//! Batch consumption loop with durable resume positions.
//!
//! The loop polls a [`MessageStream`] in batches, decodes each entry and
//! hands the decoded item to the caller. The cursor is persisted only
//! after a whole batch has been handled, so after a crash some messages
//! are seen again rather than lost. Item-level problems are skipped with
//! a warning; contract violations and handler failures terminate the
//! loop, they indicate a broken deployment rather than a bad message.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, trace, warn};

use super::cursor::{CursorError, CursorStore};
use super::{MessageStream, StreamCursor, StreamEntry, StreamError};

/// Classification of decode failures: recoverable item problems versus
/// violations of the stream contract.
pub trait DecodeFailure: std::error::Error {
    fn is_defect(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Key the resume position is persisted under; also names the
    /// consumer in logs.
    pub cursor_key: String,
    pub batch_size: usize,
    /// How long to wait before polling again after an empty batch.
    pub empty_batch_delay: Duration,
    /// Explicit start position, overriding the persisted cursor.
    pub start: Option<StreamCursor>,
}

impl ConsumerConfig {
    pub fn new(cursor_key: impl Into<String>) -> Self {
        Self {
            cursor_key: cursor_key.into(),
            batch_size: 100,
            empty_batch_delay: Duration::from_millis(500),
            start: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_empty_batch_delay(mut self, delay: Duration) -> Self {
        self.empty_batch_delay = delay;
        self
    }

    pub fn with_start(mut self, start: StreamCursor) -> Self {
        self.start = Some(start);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Cursor(#[from] CursorError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError<F, E>
where
    F: std::error::Error + 'static,
    E: std::error::Error + 'static,
{
    #[error("could not resolve the resume position: {0}")]
    Resume(#[from] ResumeError),
    #[error("reading from the stream failed: {0}")]
    Stream(#[from] StreamError),
    #[error("persisting the cursor failed: {0}")]
    Cursor(#[from] CursorError),
    #[error("message {message_id} violates the stream contract: {source}")]
    Decode { message_id: String, source: F },
    #[error("handling message {message_id} failed: {source}")]
    Handler { message_id: String, source: E },
}

/// Where a consumer starts reading: an explicit override wins, then the
/// persisted cursor, then the tail of the stream as it is right now.
pub async fn resolve_resume_position<S, C>(
    config: &ConsumerConfig,
    stream: &S,
    cursors: &C,
) -> Result<StreamCursor, ResumeError>
where
    S: MessageStream,
    C: CursorStore,
{
    let cursor = match &config.start {
        Some(cursor) => cursor.clone(),
        None => cursors
            .read(&config.cursor_key)
            .await?
            .unwrap_or_else(StreamCursor::latest),
    };
    if cursor.is_latest() {
        return Ok(stream.last_id().await?);
    }
    Ok(cursor)
}

/// Consumes the stream until shutdown is signalled or a defect occurs.
///
/// `decode` turns a raw entry into an item; failures it classifies as
/// defects end the loop, all others skip the entry. `handle` is called
/// once per decoded item and must succeed for the batch to be
/// acknowledged.
pub async fn run<S, C, T, F, D, H, Fut, E>(
    config: ConsumerConfig,
    stream: &S,
    cursors: &C,
    decode: D,
    mut handle: H,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ConsumerError<F, E>>
where
    S: MessageStream,
    C: CursorStore,
    D: Fn(&StreamEntry) -> Result<T, F>,
    F: DecodeFailure + 'static,
    H: FnMut(&str, T) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::error::Error + 'static,
{
    let mut cursor = resolve_resume_position(&config, stream, cursors).await?;
    info!(
        consumer = %config.cursor_key,
        cursor = %cursor,
        "consuming stream"
    );

    loop {
        if *shutdown.borrow() {
            break;
        }
        let batch = tokio::select! {
            batch = stream.read_batch(&cursor, config.batch_size) => batch?,
            _ = shutdown.changed() => break,
        };
        if batch.is_empty() {
            tokio::select! {
                _ = tokio::time::sleep(config.empty_batch_delay) => {}
                _ = shutdown.changed() => break,
            }
            continue;
        }

        let batch_len = batch.len();
        let mut last_id = None;
        for entry in batch {
            match decode(&entry) {
                Ok(item) => {
                    handle(&entry.id, item)
                        .await
                        .map_err(|source| ConsumerError::Handler {
                            message_id: entry.id.clone(),
                            source,
                        })?;
                }
                Err(source) if source.is_defect() => {
                    return Err(ConsumerError::Decode {
                        message_id: entry.id,
                        source,
                    });
                }
                Err(error) => {
                    warn!(
                        consumer = %config.cursor_key,
                        message_id = %entry.id,
                        %error,
                        "skipping message that could not be decoded"
                    );
                }
            }
            last_id = Some(entry.id);
        }

        if let Some(id) = last_id {
            let next = StreamCursor::new(id);
            cursors.write(&config.cursor_key, &next).await?;
            trace!(
                consumer = %config.cursor_key,
                cursor = %next,
                handled = batch_len,
                "batch acknowledged"
            );
            cursor = next;
        }
    }
    Ok(())
}
