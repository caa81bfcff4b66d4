//! Periodic feed file writer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use super::{FeedAggregator, encoded_feed};

/// Configuration for the feed file writer.
#[derive(Debug, Clone)]
pub struct FeedWriterConfig {
    /// Where the encoded feed gets written.
    pub path: PathBuf,

    /// How often a changed feed is flushed to disk.
    pub interval: Duration,
}

impl FeedWriterConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            interval: Duration::from_secs(60),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Flushes the aggregated feed to disk whenever it changed since the
/// previous flush.
pub struct FeedWriter {
    aggregator: Arc<FeedAggregator>,
    config: FeedWriterConfig,
}

impl FeedWriter {
    pub fn new(aggregator: Arc<FeedAggregator>, config: FeedWriterConfig) -> Self {
        Self { aggregator, config }
    }

    /// Runs until shutdown, writing at most once per interval. A final
    /// flush on shutdown persists whatever arrived since the last tick.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        // First tick is immediate, skip it.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.aggregator.take_dirty() {
                        self.write_once().await;
                    }
                }
                _ = shutdown.changed() => {
                    if self.aggregator.take_dirty() {
                        self.write_once().await;
                    }
                    break;
                }
            }
        }
    }

    async fn write_once(&self) {
        let encoded = encoded_feed(&self.aggregator).await;
        let entities = self.aggregator.entity_count().await;
        match write_atomic(&self.config.path, &encoded).await {
            Ok(()) => info!(
                bytes = encoded.len(),
                entities,
                path = %self.config.path.display(),
                "feed written",
            ),
            Err(error) => error!(
                %error,
                path = %self.config.path.display(),
                "feed write failed",
            ),
        }
    }
}

/// Writes via a temporary file and a rename, so feed readers never
/// observe a partially written file.
async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}
