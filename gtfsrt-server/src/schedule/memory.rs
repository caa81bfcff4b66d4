//! In-memory reference schedule.
//!
//! Holds the full row table and answers trip-instance queries with the
//! same semantics a SQL-backed store would implement: filter by service
//! day and route, then demand one qualifying stop per criterion at
//! strictly increasing stop positions.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{Duration, NaiveDate};
use geo::{Distance, Haversine, Point};

use super::{
    MatchOutcome, ScheduleError, ScheduleStopTimeRow, ScheduleStore, StopTimeFilter,
    TripInstanceQuery,
};

/// How far a realtime stop may be from a schedule stop for the
/// name-and-proximity criterion.
const MAX_STOP_DISTANCE_METERS: f64 = 200.0;

#[derive(Debug, thiserror::Error)]
pub enum ScheduleLoadError {
    #[error("schedule file could not be read: {0}")]
    Io(#[from] std::io::Error),
    #[error("schedule file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// [`ScheduleStore`] over a preloaded row table.
#[derive(Debug, Default)]
pub struct InMemoryScheduleStore {
    rows: Vec<ScheduleStopTimeRow>,
}

impl InMemoryScheduleStore {
    pub fn new(rows: Vec<ScheduleStopTimeRow>) -> Self {
        Self { rows }
    }

    /// Loads a row table from a JSON array file.
    pub fn from_json_file(path: &Path) -> Result<Self, ScheduleLoadError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::new(serde_json::from_str(&text)?))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl ScheduleStore for InMemoryScheduleStore {
    async fn find_trip_instance(
        &self,
        query: &TripInstanceQuery,
    ) -> Result<MatchOutcome, ScheduleError> {
        let mut by_trip: BTreeMap<(&str, NaiveDate), Vec<&ScheduleStopTimeRow>> = BTreeMap::new();
        for row in &self.rows {
            if row.date != query.service_date {
                continue;
            }
            if !query.route_names.is_empty()
                && !row
                    .route_short_name
                    .as_ref()
                    .is_some_and(|name| query.route_names.contains(name))
            {
                continue;
            }
            by_trip
                .entry((row.trip_id.as_str(), row.date))
                .or_default()
                .push(row);
        }

        let mut matched: Option<Vec<&ScheduleStopTimeRow>> = None;
        let mut candidates = 0;
        for trip_rows in by_trip.into_values() {
            let mut trip_rows = trip_rows;
            trip_rows.sort_by_key(|row| row.stop_sequence_consec);
            if trip_qualifies(&trip_rows, &query.stops) {
                candidates += 1;
                matched = Some(trip_rows);
            }
        }

        match (candidates, matched) {
            (1, Some(rows)) => Ok(MatchOutcome::Matched(
                rows.into_iter().cloned().collect(),
            )),
            (0, _) => Ok(MatchOutcome::Unmatched),
            (candidates, _) => Ok(MatchOutcome::Ambiguous { candidates }),
        }
    }
}

/// Every criterion must be satisfied by some stop of the trip, and the
/// satisfying stops must appear at strictly increasing positions. The
/// smallest qualifying position is taken each step; criteria arrive in
/// trip order, so a greedy choice never blocks a later criterion.
fn trip_qualifies(trip_rows: &[&ScheduleStopTimeRow], filters: &[StopTimeFilter]) -> bool {
    let mut min_sequence: Option<u32> = None;
    for filter in filters {
        let found = trip_rows
            .iter()
            .filter(|row| min_sequence.is_none_or(|min| row.stop_sequence_consec > min))
            .find(|row| row_qualifies(row, filter));
        match found {
            Some(row) => min_sequence = Some(row.stop_sequence_consec),
            None => return false,
        }
    }
    true
}

fn row_qualifies(row: &ScheduleStopTimeRow, filter: &StopTimeFilter) -> bool {
    let Some(departure) = row.departure else {
        return false;
    };
    let window = Duration::minutes(1);
    if departure < filter.departure - window || departure > filter.departure + window {
        return false;
    }
    if let Some(id) = &filter.stop_id {
        if row.stop_id == *id || row.station_id.as_deref() == Some(id.as_str()) {
            return true;
        }
    }
    if let Some(sequence) = filter.stop_sequence {
        if row.stop_sequence_consec == sequence {
            return true;
        }
    }
    if let (Some(name), Some(point)) = (&filter.normalized_stop_name, filter.coordinates) {
        let name_matches = row
            .stop_name
            .as_deref()
            .is_some_and(|stop_name| stop_name.to_lowercase().contains(name.as_str()));
        let close_enough = row
            .stop_lat
            .zip(row.stop_lon)
            .is_some_and(|(lat, lon)| {
                Haversine.distance(point, Point::new(lon, lat)) < MAX_STOP_DISTANCE_METERS
            });
        if name_matches && close_enough {
            return true;
        }
    }
    false
}
