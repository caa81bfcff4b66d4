//! The per-message pipeline: store the item, then rebuild and republish
//! the whole trip it belongs to.
//!
//! Rebuilding from everything currently stored, instead of patching the
//! previously published update, makes handling idempotent: replaying a
//! message, receiving a rewrite of a stop, or losing a change to its ttl
//! all converge on the same published state.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::assemble;
use crate::domain::trip_instance_range;
use crate::feed::FeedAggregator;
use crate::iris::{IrisChangeItem, IrisPlanItem, RealtimeItemStore, StoreError};
use crate::kv::KeyValueStore;
use crate::matching::Matcher;
use crate::merge::{self, Equivalence};
use crate::schedule::{MatchOutcome, ScheduleError, ScheduleStore};
use crate::stations::StationTable;

/// Configuration for the message pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Tolerate small scheduled-time differences when pairing realtime
    /// stops with schedule stops.
    pub fuzzy_time_matching: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// Handles decoded realtime items end to end: retention, schedule
/// matching, assembly, merge and publication.
pub struct Pipeline<K, S> {
    items: RealtimeItemStore<K>,
    matcher: Matcher<S>,
    stations: Arc<StationTable>,
    aggregator: Arc<FeedAggregator>,
    equivalence: Equivalence,
}

impl<K: KeyValueStore, S: ScheduleStore> Pipeline<K, S> {
    pub fn new(
        items: RealtimeItemStore<K>,
        matcher: Matcher<S>,
        stations: Arc<StationTable>,
        aggregator: Arc<FeedAggregator>,
        config: &PipelineConfig,
    ) -> Self {
        let mut equivalence = Equivalence::new();
        if config.fuzzy_time_matching {
            equivalence = equivalence.with_fuzzy_times();
        }
        Self {
            items,
            matcher,
            stations,
            aggregator,
            equivalence,
        }
    }

    pub async fn handle_plan(&self, item: IrisPlanItem) -> Result<(), PipelineError> {
        self.items.put_plan(&item).await?;
        self.rebuild(&item.raw_id).await
    }

    pub async fn handle_change(&self, item: IrisChangeItem) -> Result<(), PipelineError> {
        self.items.put_change(&item).await?;
        self.rebuild(&item.raw_id).await
    }

    /// Rebuilds the published update of the trip instance the given stop
    /// belongs to.
    async fn rebuild(&self, raw_id: &str) -> Result<(), PipelineError> {
        let Some(range) = trip_instance_range(raw_id) else {
            warn!(raw_id, "id does not name a trip instance, message ignored");
            return Ok(());
        };
        let plans = self.items.read_plans(&range).await?;
        if plans.is_empty() {
            // A change can arrive before any plan of its trip; it stays
            // cached until one does.
            debug!(raw_id, "no plan items for this trip yet");
            return Ok(());
        }
        let changes = self.items.read_changes(&range).await?;

        let outcome = self.matcher.match_trip(&plans).await?;
        let MatchOutcome::Matched(rows) = outcome else {
            return Ok(());
        };
        let Some(schedule_side) = assemble::from_schedule_rows(&rows) else {
            return Ok(());
        };
        let Some(realtime_side) = assemble::from_realtime_items(&plans, &changes, &self.stations)
        else {
            return Ok(());
        };

        let update = merge::merge_trip_updates(&schedule_side, &realtime_side, &self.equivalence);
        self.aggregator.publish(update).await;
        Ok(())
    }
}
