//! Published feed shapes.
//!
//! These mirror the GTFS-RT trip update structures but stay plain Rust:
//! every field is optional exactly where the feed allows omission, which
//! is what the merge step relies on when it combines the schedule-derived
//! and realtime-derived views of a trip.

use serde::{Deserialize, Serialize};

/// Relationship of a whole trip to the static schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TripScheduleRelationship {
    Scheduled,
    Added,
    Canceled,
}

/// Relationship of a single stop time to the static schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopScheduleRelationship {
    Scheduled,
    Added,
    Skipped,
}

/// Arrival or departure timing of one stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopTimeEvent {
    /// Expected absolute time, unix seconds.
    pub time: Option<i64>,
    /// Deviation from the planned time in seconds.
    pub delay: Option<i32>,
}

/// Timing update for one stop of a trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopTimeUpdate {
    pub stop_sequence: Option<u32>,
    pub stop_id: Option<String>,
    pub arrival: Option<StopTimeEvent>,
    pub departure: Option<StopTimeEvent>,
    pub schedule_relationship: Option<StopScheduleRelationship>,
}

/// Identification of the trip an update belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripDescriptor {
    pub trip_id: Option<String>,
    pub route_id: Option<String>,
    pub direction_id: Option<u32>,
    /// First departure of the trip as local `HH:MM:SS`.
    pub start_time: Option<String>,
    /// Service day as `YYYYMMDD`.
    pub start_date: Option<String>,
    pub schedule_relationship: Option<TripScheduleRelationship>,
}

/// One published feed entity: a trip and its per-stop timing updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripUpdate {
    pub trip: TripDescriptor,
    pub stop_time_update: Vec<StopTimeUpdate>,
}
