//! Reference schedule access.
//!
//! The static schedule is exposed as one denormalized row per stop time
//! of a trip instance, the shape a joined GTFS query produces. Matching
//! asks the store to resolve a set of per-stop criteria to exactly one
//! trip instance; anything else is reported as unmatched or ambiguous
//! rather than guessed.

pub mod memory;

pub use memory::{InMemoryScheduleStore, ScheduleLoadError};

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use geo::Point;
use serde::{Deserialize, Serialize};

/// One stop time of a trip instance, joined with its trip, route and
/// stop attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleStopTimeRow {
    pub route_id: String,
    pub route_short_name: Option<String>,
    pub trip_id: String,
    pub direction_id: Option<u32>,
    /// Service day the trip instance runs on.
    pub date: NaiveDate,
    /// Position of this stop within the trip, consecutive from 0.
    pub stop_sequence_consec: u32,
    pub stop_id: String,
    /// Parent station of the stop, when the feed models one.
    pub station_id: Option<String>,
    pub stop_name: Option<String>,
    pub stop_lat: Option<f64>,
    pub stop_lon: Option<f64>,
    pub arrival: Option<DateTime<Utc>>,
    pub departure: Option<DateTime<Utc>>,
}

/// Criteria describing one realtime stop of the trip being resolved.
#[derive(Debug, Clone)]
pub struct StopTimeFilter {
    /// Planned departure; schedule candidates must depart within a
    /// minute of it.
    pub departure: DateTime<Utc>,
    /// Station code as a stop or station id.
    pub stop_id: Option<String>,
    /// Stop position within the trip, counting service stops.
    pub stop_sequence: Option<u32>,
    pub normalized_stop_name: Option<String>,
    pub coordinates: Option<Point<f64>>,
}

/// Query resolving a realtime trip to a schedule trip instance.
#[derive(Debug, Clone)]
pub struct TripInstanceQuery {
    pub service_date: NaiveDate,
    /// Acceptable route short names; empty means any route.
    pub route_names: Vec<String>,
    /// Per-stop criteria that must all hold, on stops with strictly
    /// increasing positions.
    pub stops: Vec<StopTimeFilter>,
}

/// Result of a resolution attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// Exactly one trip instance qualified; its complete stop times in
    /// stop order.
    Matched(Vec<ScheduleStopTimeRow>),
    Unmatched,
    /// More than one trip instance qualified; none is trusted.
    Ambiguous { candidates: usize },
}

#[derive(Debug, thiserror::Error)]
#[error("schedule store query failed: {reason}")]
pub struct ScheduleError {
    reason: String,
}

impl ScheduleError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

pub trait ScheduleStore: Send + Sync {
    fn find_trip_instance(
        &self,
        query: &TripInstanceQuery,
    ) -> impl Future<Output = Result<MatchOutcome, ScheduleError>> + Send;
}
