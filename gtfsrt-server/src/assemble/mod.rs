//! Assembly of the two per-trip views that get merged into the
//! published update: one built from matched schedule rows, one built
//! from the realtime plan and change messages of a trip.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use geo::Point;
use tracing::warn;

use crate::domain::{
    DB_TIMEZONE, StopScheduleRelationship, StopTimeEvent, StopTimeUpdate, TripDescriptor,
    TripScheduleRelationship,
};
use crate::iris::{IrisChangeItem, IrisPlanItem, IrisStopEvent};
use crate::merge::{AnnotatedStopTimeUpdate, AnnotatedTripUpdate, MatchingContext};
use crate::schedule::ScheduleStopTimeRow;
use crate::stations::{StationTable, normalize_stop_name};

/// Maps the wire status of a changed stop onto the published relationship.
/// `p` (planned) and unknown statuses mean no explicit relationship.
fn schedule_relationship_for_status(status: &str) -> Option<StopScheduleRelationship> {
    match status {
        "a" => Some(StopScheduleRelationship::Added),
        "c" => Some(StopScheduleRelationship::Skipped),
        _ => None,
    }
}

/// Builds a stop-time event from the planned and the changed instant.
///
/// The event reports the changed time when one exists and the planned
/// time otherwise; the delay can only be computed when both are known.
///
/// ```
/// use chrono::DateTime;
/// use gtfsrt_server::assemble::stop_time_event;
///
/// let planned = DateTime::parse_from_rfc3339("2025-01-30T22:07:00+00:00")
///     .unwrap()
///     .to_utc();
/// let changed = DateTime::parse_from_rfc3339("2025-01-30T22:10:00+00:00")
///     .unwrap()
///     .to_utc();
/// let event = stop_time_event(Some(planned), Some(changed));
/// assert_eq!(event.time, Some(1_738_275_000));
/// assert_eq!(event.delay, Some(180));
/// ```
pub fn stop_time_event(
    planned: Option<DateTime<Utc>>,
    changed: Option<DateTime<Utc>>,
) -> StopTimeEvent {
    StopTimeEvent {
        time: changed.or(planned).map(|instant| instant.timestamp()),
        delay: planned
            .zip(changed)
            .map(|(planned, changed)| (changed - planned).num_seconds() as i32),
    }
}

/// Builds the schedule-side view of a trip from its matched stop-time
/// rows, which must be in stop order. Returns `None` for no rows.
pub fn from_schedule_rows(rows: &[ScheduleStopTimeRow]) -> Option<AnnotatedTripUpdate> {
    let first = rows.first()?;
    let start_time = rows.iter().find_map(|row| row.departure).map(|departure| {
        departure
            .with_timezone(&DB_TIMEZONE)
            .format("%H:%M:%S")
            .to_string()
    });
    let trip = TripDescriptor {
        trip_id: Some(first.trip_id.clone()),
        route_id: Some(first.route_id.clone()),
        direction_id: first.direction_id,
        start_time,
        start_date: Some(first.date.format("%Y%m%d").to_string()),
        schedule_relationship: Some(TripScheduleRelationship::Scheduled),
    };
    let stop_time_updates = rows
        .iter()
        .map(|row| AnnotatedStopTimeUpdate {
            update: StopTimeUpdate {
                stop_sequence: Some(row.stop_sequence_consec),
                stop_id: Some(row.stop_id.clone()),
                arrival: Some(stop_time_event(row.arrival, None)),
                departure: Some(stop_time_event(row.departure, None)),
                schedule_relationship: None,
            },
            context: MatchingContext {
                normalized_stop_name: row.stop_name.as_deref().map(normalize_stop_name),
                coordinates: row
                    .stop_lat
                    .zip(row.stop_lon)
                    .map(|(lat, lon)| Point::new(lon, lat)),
                realtime_stop_sequence: None,
            },
        })
        .collect();
    Some(AnnotatedTripUpdate {
        trip,
        stop_time_updates,
    })
}

fn changed_time(event: Option<&IrisStopEvent>) -> Option<DateTime<Utc>> {
    event.and_then(|event| event.changed_time)
}

fn planned_time(event: Option<&IrisStopEvent>) -> Option<DateTime<Utc>> {
    event.and_then(|event| event.planned_time)
}

/// Builds the realtime-side view of a trip from its plan items, in stop
/// order, with any cached changes applied on top. Returns `None` when no
/// plan items exist yet; changes alone say nothing about the trip shape.
///
/// The trip descriptor is left empty. The schedule side knows the feed's
/// own identifiers for the trip, so its descriptor wins the merge anyway.
pub fn from_realtime_items(
    plans: &[IrisPlanItem],
    changes: &[IrisChangeItem],
    stations: &StationTable,
) -> Option<AnnotatedTripUpdate> {
    if plans.is_empty() {
        return None;
    }
    let changes_by_raw_id: HashMap<&str, &IrisChangeItem> = changes
        .iter()
        .map(|item| (item.raw_id.as_str(), item))
        .collect();

    let stop_time_updates = plans
        .iter()
        .map(|item| {
            let change = changes_by_raw_id.get(item.raw_id.as_str()).copied();
            let station = stations.get(item.stop_id);
            if station.is_none() {
                warn!(
                    stop_id = %item.stop_id,
                    raw_id = %item.raw_id,
                    "station code not in the station table, stop will only match by id",
                );
            }
            let arrival = stop_time_event(
                planned_time(item.plan.arrival.as_ref()),
                changed_time(change.and_then(|change| change.change.arrival.as_ref())),
            );
            let departure = stop_time_event(
                planned_time(item.plan.departure.as_ref()),
                changed_time(change.and_then(|change| change.change.departure.as_ref())),
            );
            let status = change.and_then(|change| change.change.changed_status());
            AnnotatedStopTimeUpdate {
                update: StopTimeUpdate {
                    stop_sequence: None,
                    stop_id: Some(item.stop_id.to_string()),
                    arrival: Some(arrival),
                    departure: Some(departure),
                    schedule_relationship: status.and_then(schedule_relationship_for_status),
                },
                context: MatchingContext {
                    normalized_stop_name: station.map(|station| station.normalized_name.clone()),
                    coordinates: station.map(|station| station.coordinates()),
                    realtime_stop_sequence: item.plan.stop_sequence_id,
                },
            }
        })
        .collect();

    Some(AnnotatedTripUpdate {
        trip: TripDescriptor::default(),
        stop_time_updates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::domain::{EvaNumber, ServiceDate};
    use crate::iris::{IrisChangePayload, IrisPlanPayload};
    use crate::stations::Station;

    fn utc(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).unwrap().to_utc()
    }

    #[test]
    fn delay_is_the_difference_between_changed_and_planned() {
        let event = stop_time_event(
            Some(utc("2025-01-30T22:07:00+00:00")),
            Some(utc("2025-01-30T22:10:00+00:00")),
        );
        assert_eq!(event.time, Some(1_738_275_000));
        assert_eq!(event.delay, Some(180));
    }

    #[test]
    fn a_plan_without_a_change_has_no_delay() {
        let event = stop_time_event(Some(utc("2025-01-30T22:07:00+00:00")), None);
        assert_eq!(event.time, Some(1_738_274_820));
        assert_eq!(event.delay, None);
    }

    #[test]
    fn missing_times_yield_an_empty_event() {
        assert_eq!(stop_time_event(None, None), StopTimeEvent::default());
    }

    #[test]
    fn statuses_map_to_relationships() {
        assert_eq!(
            schedule_relationship_for_status("c"),
            Some(StopScheduleRelationship::Skipped)
        );
        assert_eq!(
            schedule_relationship_for_status("a"),
            Some(StopScheduleRelationship::Added)
        );
        assert_eq!(schedule_relationship_for_status("p"), None);
        assert_eq!(schedule_relationship_for_status(""), None);
    }

    fn schedule_row(
        seq: u32,
        stop_id: &str,
        departure: Option<DateTime<Utc>>,
    ) -> ScheduleStopTimeRow {
        ScheduleStopTimeRow {
            route_id: "route-44".to_string(),
            route_short_name: Some("RB44".to_string()),
            trip_id: "trip-1".to_string(),
            direction_id: Some(0),
            date: NaiveDate::from_ymd_opt(2025, 1, 28).unwrap(),
            stop_sequence_consec: seq,
            stop_id: stop_id.to_string(),
            station_id: None,
            stop_name: Some("Tapfheim".to_string()),
            stop_lat: Some(48.6775),
            stop_lon: Some(10.7055),
            arrival: None,
            departure,
        }
    }

    #[test]
    fn schedule_rows_become_the_schedule_side_view() {
        let rows = vec![
            schedule_row(11, "de:stop:1", Some(utc("2025-01-28T15:01:00+00:00"))),
            schedule_row(12, "de:stop:2", Some(utc("2025-01-28T15:09:00+00:00"))),
        ];
        let view = from_schedule_rows(&rows).unwrap();

        assert_eq!(view.trip.trip_id.as_deref(), Some("trip-1"));
        assert_eq!(view.trip.route_id.as_deref(), Some("route-44"));
        assert_eq!(view.trip.start_date.as_deref(), Some("20250128"));
        // 15:01 UTC is 16:01 in Berlin in January.
        assert_eq!(view.trip.start_time.as_deref(), Some("16:01:00"));
        assert_eq!(
            view.trip.schedule_relationship,
            Some(TripScheduleRelationship::Scheduled)
        );

        assert_eq!(view.stop_time_updates.len(), 2);
        let first = &view.stop_time_updates[0];
        assert_eq!(first.update.stop_sequence, Some(11));
        assert_eq!(first.update.stop_id.as_deref(), Some("de:stop:1"));
        assert_eq!(first.update.arrival, Some(StopTimeEvent::default()));
        assert_eq!(
            first.update.departure,
            Some(stop_time_event(
                Some(utc("2025-01-28T15:01:00+00:00")),
                None
            ))
        );
        assert_eq!(
            first.context.normalized_stop_name.as_deref(),
            Some("tapfheim")
        );
        assert_eq!(first.context.coordinates, Some(Point::new(10.7055, 48.6775)));
    }

    #[test]
    fn start_time_comes_from_the_first_stop_with_a_departure() {
        let rows = vec![
            schedule_row(1, "de:stop:1", None),
            schedule_row(2, "de:stop:2", Some(utc("2025-01-28T15:09:00+00:00"))),
        ];
        let view = from_schedule_rows(&rows).unwrap();
        assert_eq!(view.trip.start_time.as_deref(), Some("16:09:00"));
    }

    #[test]
    fn no_rows_mean_no_schedule_view() {
        assert_eq!(from_schedule_rows(&[]), None);
    }

    fn stations() -> StationTable {
        StationTable::new(vec![Station {
            eva: EvaNumber::new(8_000_001),
            name: "Tapfheim".to_string(),
            normalized_name: "tapfheim".to_string(),
            latitude: 48.6775,
            longitude: 10.7055,
        }])
    }

    fn plan_item(raw_id: &str, eva: u32, departure: &str) -> IrisPlanItem {
        IrisPlanItem {
            message_id: "1-0".to_string(),
            service_date: ServiceDate::new(NaiveDate::from_ymd_opt(2025, 1, 28).unwrap()),
            stop_id: EvaNumber::new(eva),
            raw_id: raw_id.to_string(),
            plan: IrisPlanPayload {
                raw_id: Some(raw_id.to_string()),
                stop_sequence_id: Some(7),
                trip_label: None,
                arrival: None,
                departure: Some(IrisStopEvent {
                    planned_time: Some(utc(departure)),
                    changed_time: None,
                    planned_platform: None,
                    changed_platform: None,
                    changed_status: None,
                    line: None,
                    planned_path: None,
                }),
            },
        }
    }

    fn change_item(raw_id: &str, eva: u32, changed: &str, status: &str) -> IrisChangeItem {
        IrisChangeItem {
            message_id: "2-0".to_string(),
            service_date: ServiceDate::new(NaiveDate::from_ymd_opt(2025, 1, 28).unwrap()),
            stop_id: EvaNumber::new(eva),
            raw_id: raw_id.to_string(),
            change: IrisChangePayload {
                raw_id: Some(raw_id.to_string()),
                arrival: None,
                departure: Some(IrisStopEvent {
                    planned_time: None,
                    changed_time: Some(utc(changed)),
                    planned_platform: None,
                    changed_platform: None,
                    changed_status: Some(status.to_string()),
                    line: None,
                    planned_path: None,
                }),
            },
        }
    }

    #[test]
    fn changes_apply_to_the_plan_item_with_the_same_raw_id() {
        let plans = vec![
            plan_item("x-2501281447-1", 8_000_001, "2025-01-28T15:01:00+00:00"),
            plan_item("x-2501281447-2", 8_000_999, "2025-01-28T15:09:00+00:00"),
        ];
        let changes = vec![change_item(
            "x-2501281447-2",
            8_000_999,
            "2025-01-28T15:12:00+00:00",
            "c",
        )];

        let view = from_realtime_items(&plans, &changes, &stations()).unwrap();
        assert_eq!(view.trip, TripDescriptor::default());
        assert_eq!(view.stop_time_updates.len(), 2);

        let unchanged = &view.stop_time_updates[0];
        assert_eq!(unchanged.update.stop_id.as_deref(), Some("8000001"));
        assert_eq!(unchanged.update.schedule_relationship, None);
        assert_eq!(
            unchanged.update.departure,
            Some(StopTimeEvent {
                time: Some(utc("2025-01-28T15:01:00+00:00").timestamp()),
                delay: None,
            })
        );

        let changed = &view.stop_time_updates[1];
        assert_eq!(
            changed.update.schedule_relationship,
            Some(StopScheduleRelationship::Skipped)
        );
        assert_eq!(
            changed.update.departure,
            Some(StopTimeEvent {
                time: Some(utc("2025-01-28T15:12:00+00:00").timestamp()),
                delay: Some(180),
            })
        );
    }

    #[test]
    fn known_stations_fill_the_matching_context() {
        let plans = vec![plan_item(
            "x-2501281447-1",
            8_000_001,
            "2025-01-28T15:01:00+00:00",
        )];
        let view = from_realtime_items(&plans, &[], &stations()).unwrap();
        let stop = &view.stop_time_updates[0];
        assert_eq!(stop.context.normalized_stop_name.as_deref(), Some("tapfheim"));
        assert_eq!(stop.context.coordinates, Some(Point::new(10.7055, 48.6775)));
        assert_eq!(stop.context.realtime_stop_sequence, Some(7));
    }

    #[test]
    fn unknown_stations_leave_the_context_empty() {
        let plans = vec![plan_item(
            "x-2501281447-1",
            8_000_999,
            "2025-01-28T15:01:00+00:00",
        )];
        let view = from_realtime_items(&plans, &[], &stations()).unwrap();
        let stop = &view.stop_time_updates[0];
        assert_eq!(stop.update.stop_id.as_deref(), Some("8000999"));
        assert_eq!(stop.context.normalized_stop_name, None);
        assert_eq!(stop.context.coordinates, None);
        assert_eq!(stop.context.realtime_stop_sequence, Some(7));
    }

    #[test]
    fn changes_alone_do_not_form_a_view() {
        let changes = vec![change_item(
            "x-2501281447-1",
            8_000_001,
            "2025-01-28T15:12:00+00:00",
            "c",
        )];
        assert_eq!(from_realtime_items(&[], &changes, &stations()), None);
    }
}
