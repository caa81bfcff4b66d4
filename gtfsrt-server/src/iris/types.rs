//! Realtime message payloads.
//!
//! Two kinds of message exist: a *plan* carries the per-stop baseline
//! schedule as the dispatch system knows it, a *change* carries a delta
//! against a previously sent plan. Both reference the same composite
//! `raw_id`. Field presence varies a lot in practice, so everything in
//! the payloads is optional; what the pipeline genuinely relies on is
//! validated once at the decode boundary and carried in the envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{EvaNumber, ServiceDate};

/// Label describing the operating line of a trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrisTripLabel {
    pub category: Option<String>,
    pub number: Option<String>,
    pub owner: Option<String>,
}

/// Arrival or departure half of one timetable stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrisStopEvent {
    pub planned_time: Option<DateTime<Utc>>,
    pub changed_time: Option<DateTime<Utc>>,
    pub planned_platform: Option<String>,
    pub changed_platform: Option<String>,
    /// `a` for an added stop, `c` for a cancelled one, `p` for planned.
    pub changed_status: Option<String>,
    pub line: Option<String>,
    /// Names of the stops before (arrival) or after (departure) this one.
    pub planned_path: Option<Vec<String>>,
}

/// Per-stop baseline schedule as known to the dispatch system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrisPlanPayload {
    pub raw_id: Option<String>,
    pub stop_sequence_id: Option<u32>,
    pub trip_label: Option<IrisTripLabel>,
    pub arrival: Option<IrisStopEvent>,
    pub departure: Option<IrisStopEvent>,
}

impl IrisPlanPayload {
    /// Line name as reported on the arrival, falling back to the
    /// departure when no arrival exists.
    pub fn line(&self) -> Option<&str> {
        self.arrival
            .as_ref()
            .or(self.departure.as_ref())
            .and_then(|event| event.line.as_deref())
    }

    pub fn category(&self) -> Option<&str> {
        self.trip_label
            .as_ref()
            .and_then(|label| label.category.as_deref())
    }
}

/// Delta against a previously sent plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrisChangePayload {
    pub raw_id: Option<String>,
    pub arrival: Option<IrisStopEvent>,
    pub departure: Option<IrisStopEvent>,
}

impl IrisChangePayload {
    /// Status of the change, preferring the arrival's over the departure's.
    pub fn changed_status(&self) -> Option<&str> {
        self.arrival
            .as_ref()
            .and_then(|event| event.changed_status.as_deref())
            .or_else(|| {
                self.departure
                    .as_ref()
                    .and_then(|event| event.changed_status.as_deref())
            })
    }
}

/// One decoded and validated plan message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrisPlanItem {
    /// Stream id of the message this item came from.
    pub message_id: String,
    pub service_date: ServiceDate,
    /// Station the stop belongs to.
    pub stop_id: EvaNumber,
    /// Composite timetable stop id, also the storage key.
    pub raw_id: String,
    pub plan: IrisPlanPayload,
}

/// One decoded and validated change message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrisChangeItem {
    pub message_id: String,
    pub service_date: ServiceDate,
    pub stop_id: EvaNumber,
    pub raw_id: String,
    pub change: IrisChangePayload,
}
