//! Durable consumer positions.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use crate::kv::{KeyValueStore, KvError};

use super::StreamCursor;

#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    #[error("cursor file access failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cursor store access failed: {0}")]
    Store(#[from] KvError),
}

/// Persistence for the resume position of a stream consumer.
pub trait CursorStore: Send + Sync {
    fn read(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<StreamCursor>, CursorError>> + Send;

    fn write(
        &self,
        key: &str,
        cursor: &StreamCursor,
    ) -> impl Future<Output = Result<(), CursorError>> + Send;
}

/// Cursor persistence on top of a [`KeyValueStore`]. Cursor keys never
/// expire.
pub struct KvCursorStore<K> {
    kv: Arc<K>,
    prefix: String,
}

impl<K> KvCursorStore<K> {
    pub fn new(kv: Arc<K>) -> Self {
        Self {
            kv,
            prefix: "cur:".to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn key_for(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

impl<K: KeyValueStore> CursorStore for KvCursorStore<K> {
    async fn read(&self, key: &str) -> Result<Option<StreamCursor>, CursorError> {
        let value = self.kv.get(&self.key_for(key)).await?;
        Ok(value.map(StreamCursor::new))
    }

    async fn write(&self, key: &str, cursor: &StreamCursor) -> Result<(), CursorError> {
        self.kv
            .set(&self.key_for(key), cursor.as_str(), None)
            .await?;
        Ok(())
    }
}

/// File-backed cursor persistence for single-process deployments.
///
/// One file per cursor key, written via a temp file and rename so a crash
/// never leaves a half-written position behind. Keys must be plain
/// file-name-safe tokens.
pub struct FileCursorStore {
    dir: PathBuf,
}

impl FileCursorStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.cursor"))
    }
}

impl CursorStore for FileCursorStore {
    async fn read(&self, key: &str) -> Result<Option<StreamCursor>, CursorError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(contents) => {
                let trimmed = contents.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(StreamCursor::new(trimmed)))
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write(&self, key: &str, cursor: &StreamCursor) -> Result<(), CursorError> {
        let path = self.path_for(key);
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, cursor.as_str()).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}
