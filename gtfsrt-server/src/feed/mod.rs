//! The published feed: aggregated trip updates, their protobuf encoding
//! and the periodic feed file writer.

pub mod encode;
pub mod writer;

pub use encode::{GTFS_RT_VERSION, build_feed_message, encode_feed_message};
pub use writer::{FeedWriter, FeedWriterConfig};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use moka::future::Cache as MokaCache;
use tracing::warn;

use crate::domain::{TripDescriptor, TripUpdate};

/// Configuration for the feed aggregator.
#[derive(Debug, Clone)]
pub struct FeedAggregatorConfig {
    /// How long an entity stays in the feed after its last update. Trips
    /// that stop receiving messages age out on their own.
    pub entity_ttl: Duration,

    /// Maximum number of entities the feed holds.
    pub max_entities: u64,
}

impl Default for FeedAggregatorConfig {
    fn default() -> Self {
        Self {
            entity_ttl: Duration::from_secs(5 * 60),
            max_entities: 100_000,
        }
    }
}

/// Current state of the feed, one entity per trip instance.
pub struct FeedAggregator {
    entities: MokaCache<String, TripUpdate>,

    /// Milliseconds since the epoch of the last publish, 0 for never.
    last_modified_ms: AtomicU64,

    /// Whether anything was published since the last [`take_dirty`] call.
    dirty: AtomicBool,
}

impl FeedAggregator {
    pub fn new(config: &FeedAggregatorConfig) -> Self {
        let entities = MokaCache::builder()
            .time_to_live(config.entity_ttl)
            .max_capacity(config.max_entities)
            .build();

        Self {
            entities,
            last_modified_ms: AtomicU64::new(0),
            dirty: AtomicBool::new(false),
        }
    }

    /// Feed entity id: trip id plus start date, which tells two
    /// instances of the same trip apart around midnight.
    fn entity_id(trip: &TripDescriptor) -> Option<String> {
        let trip_id = trip.trip_id.as_deref()?;
        Some(match trip.start_date.as_deref() {
            Some(start_date) => format!("{trip_id}:{start_date}"),
            None => trip_id.to_string(),
        })
    }

    /// Publishes one merged trip update, replacing any previous update
    /// for the same trip instance.
    pub async fn publish(&self, update: TripUpdate) {
        let Some(id) = Self::entity_id(&update.trip) else {
            warn!("dropping trip update without a trip id");
            return;
        };
        self.entities.insert(id, update).await;

        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
        self.last_modified_ms.store(now_ms, Ordering::Relaxed);
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Snapshot of the current entities, ordered by entity id so that
    /// consecutive feeds list trips stably.
    pub async fn snapshot(&self) -> Vec<(String, TripUpdate)> {
        self.entities.run_pending_tasks().await;
        let mut entities: Vec<(String, TripUpdate)> = self
            .entities
            .iter()
            .map(|(id, update)| ((*id).clone(), update))
            .collect();
        entities.sort_by(|(a, _), (b, _)| a.cmp(b));
        entities
    }

    pub async fn entity_count(&self) -> u64 {
        self.entities.run_pending_tasks().await;
        self.entities.entry_count()
    }

    /// Seconds since the epoch of the last publish.
    pub fn last_modified_secs(&self) -> Option<u64> {
        match self.last_modified_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms / 1000),
        }
    }

    pub fn has_published(&self) -> bool {
        self.last_modified_ms.load(Ordering::Relaxed) != 0
    }

    /// True when something was published since the previous call.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::Relaxed)
    }
}

/// Encodes the aggregator's current state as feed wire bytes.
pub async fn encoded_feed(aggregator: &FeedAggregator) -> Vec<u8> {
    let entities = aggregator.snapshot().await;
    let timestamp = aggregator.last_modified_secs().unwrap_or(0);
    let message = build_feed_message(&entities, timestamp);
    encode_feed_message(&message)
}
