//! Combination of the schedule-derived and realtime-derived views of a
//! trip into one published update.
//!
//! The two sides list stop-time updates in stop order, but neither side
//! is complete: the realtime feed reports stops the schedule does not
//! know (and vice versa), uses its own stop ids and often disagrees
//! about positions. Combination therefore walks both sequences with two
//! pointers, pairing entries that are *equivalent* (same stop by id,
//! name or location, at the same scheduled time), merging each pair and
//! interleaving everything else without ever reordering either side.
//!
//! Equivalence is injectable because callers know more than this module
//! does, e.g. that two feeds spell the same stop id differently.

use geo::{Distance, Haversine, Point};

use crate::domain::{StopTimeEvent, StopTimeUpdate, TripDescriptor, TripUpdate};

/// Two stops closer than this are treated as the same location.
const COLOCATION_MAX_DISTANCE_METERS: f64 = 100.0;

/// Largest scheduled-time difference the fuzzy comparison accepts.
pub const TIME_MATCHING_MAX_DEVIATION_SECS: i64 = 60;

/// Matching-time metadata carried alongside a stop-time update until the
/// update is published. Kept separate from the update itself so nothing
/// of it leaks into the feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchingContext {
    pub normalized_stop_name: Option<String>,
    pub coordinates: Option<Point<f64>>,
    /// Stop position as the realtime system counts it, which includes
    /// service stops and need not line up with schedule positions.
    pub realtime_stop_sequence: Option<u32>,
}

/// A stop-time update plus the metadata used to align it with the other
/// side.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedStopTimeUpdate {
    pub update: StopTimeUpdate,
    pub context: MatchingContext,
}

impl From<StopTimeUpdate> for AnnotatedStopTimeUpdate {
    fn from(update: StopTimeUpdate) -> Self {
        Self {
            update,
            context: MatchingContext::default(),
        }
    }
}

/// A trip update whose stop sequence still carries matching metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedTripUpdate {
    pub trip: TripDescriptor,
    pub stop_time_updates: Vec<AnnotatedStopTimeUpdate>,
}

/// The instant a stop-time event was originally scheduled for: its time
/// with any delay backed out.
pub fn scheduled_time(event: Option<&StopTimeEvent>) -> Option<i64> {
    let event = event?;
    let time = event.time?;
    Some(time - i64::from(event.delay.unwrap_or(0)))
}

pub type StopIdEquality = fn(&AnnotatedStopTimeUpdate, &AnnotatedStopTimeUpdate) -> bool;
pub type StopTimeEventEquality = fn(Option<&StopTimeEvent>, Option<&StopTimeEvent>) -> bool;

/// Decides whether a schedule-side and a realtime-side entry describe
/// the same stop event.
///
/// The check is directional: the first entry must actually carry a stop
/// id for the id comparison and a scheduled time for the time
/// comparison, otherwise that clause cannot hold. Entries qualify when
/// they agree on the place (stop id, or both locations within
/// [`COLOCATION_MAX_DISTANCE_METERS`]) and on at least one scheduled
/// time, arrival or departure.
#[derive(Clone, Copy)]
pub struct Equivalence {
    stop_ids_equal: StopIdEquality,
    stop_time_events_equal: StopTimeEventEquality,
}

impl Equivalence {
    pub fn new() -> Self {
        Self {
            stop_ids_equal: default_stop_ids_equal,
            stop_time_events_equal: exact_scheduled_times,
        }
    }

    /// Tolerates scheduled times differing by up to
    /// [`TIME_MATCHING_MAX_DEVIATION_SECS`].
    pub fn with_fuzzy_times(mut self) -> Self {
        self.stop_time_events_equal = fuzzy_scheduled_times;
        self
    }

    pub fn with_stop_id_equality(mut self, stop_ids_equal: StopIdEquality) -> Self {
        self.stop_ids_equal = stop_ids_equal;
        self
    }

    fn equivalent(&self, first: &AnnotatedStopTimeUpdate, second: &AnnotatedStopTimeUpdate) -> bool {
        let equal_stop_ids =
            first.update.stop_id.is_some() && (self.stop_ids_equal)(first, second);
        let colocated = match (first.context.coordinates, second.context.coordinates) {
            (Some(a), Some(b)) => Haversine.distance(a, b) < COLOCATION_MAX_DISTANCE_METERS,
            _ => false,
        };
        if !equal_stop_ids && !colocated {
            return false;
        }
        let equal_arrivals = scheduled_time(first.update.arrival.as_ref()).is_some()
            && (self.stop_time_events_equal)(
                first.update.arrival.as_ref(),
                second.update.arrival.as_ref(),
            );
        let equal_departures = scheduled_time(first.update.departure.as_ref()).is_some()
            && (self.stop_time_events_equal)(
                first.update.departure.as_ref(),
                second.update.departure.as_ref(),
            );
        equal_arrivals || equal_departures
    }
}

impl Default for Equivalence {
    fn default() -> Self {
        Self::new()
    }
}

fn default_stop_ids_equal(
    first: &AnnotatedStopTimeUpdate,
    second: &AnnotatedStopTimeUpdate,
) -> bool {
    if first.update.stop_id == second.update.stop_id {
        return true;
    }
    match (
        &first.context.normalized_stop_name,
        &second.context.normalized_stop_name,
    ) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn exact_scheduled_times(a: Option<&StopTimeEvent>, b: Option<&StopTimeEvent>) -> bool {
    scheduled_time(a) == scheduled_time(b)
}

fn fuzzy_scheduled_times(a: Option<&StopTimeEvent>, b: Option<&StopTimeEvent>) -> bool {
    match (scheduled_time(a), scheduled_time(b)) {
        (Some(a), Some(b)) => (a - b).abs() <= TIME_MATCHING_MAX_DEVIATION_SECS,
        _ => false,
    }
}

/// Merges two updates for the same stop, field by field: the realtime
/// value wins unless it is absent. Exceptions: the stop id keeps the
/// schedule's spelling, and arrival/departure are replaced as whole
/// events so a realtime event never inherits a stale delay.
fn merge_stop_time_updates(
    schedule: &StopTimeUpdate,
    realtime: &StopTimeUpdate,
) -> StopTimeUpdate {
    StopTimeUpdate {
        stop_sequence: realtime.stop_sequence.or(schedule.stop_sequence),
        stop_id: schedule
            .stop_id
            .clone()
            .or_else(|| realtime.stop_id.clone()),
        arrival: realtime.arrival.or(schedule.arrival),
        departure: realtime.departure.or(schedule.departure),
        schedule_relationship: realtime
            .schedule_relationship
            .or(schedule.schedule_relationship),
    }
}

fn merge_trip_descriptors(schedule: &TripDescriptor, realtime: &TripDescriptor) -> TripDescriptor {
    TripDescriptor {
        trip_id: realtime
            .trip_id
            .clone()
            .or_else(|| schedule.trip_id.clone()),
        route_id: realtime
            .route_id
            .clone()
            .or_else(|| schedule.route_id.clone()),
        direction_id: realtime.direction_id.or(schedule.direction_id),
        start_time: realtime
            .start_time
            .clone()
            .or_else(|| schedule.start_time.clone()),
        start_date: realtime
            .start_date
            .clone()
            .or_else(|| schedule.start_date.clone()),
        schedule_relationship: realtime
            .schedule_relationship
            .or(schedule.schedule_relationship),
    }
}

/// Interleaves two stop sequences, merging equivalent pairs.
///
/// Both inputs must be in stop order; the output preserves each side's
/// relative order, and every input entry contributes to exactly one
/// output entry. When neither head pairs up with anything on the other
/// side, whichever head appears to come first (by position, then by
/// arrival and departure time) is emitted; with no signal at all the
/// schedule side goes first.
pub fn combine_stop_time_updates(
    schedule: &[AnnotatedStopTimeUpdate],
    realtime: &[AnnotatedStopTimeUpdate],
    equivalence: &Equivalence,
) -> Vec<StopTimeUpdate> {
    let mut merged = Vec::with_capacity(schedule.len() + realtime.len());
    let (mut si, mut ri) = (0, 0);
    loop {
        if ri >= realtime.len() {
            merged.extend(schedule[si..].iter().map(|entry| entry.update.clone()));
            break;
        }
        if si >= schedule.len() {
            merged.extend(realtime[ri..].iter().map(|entry| entry.update.clone()));
            break;
        }
        let sched = &schedule[si];
        let rt = &realtime[ri];
        if equivalence.equivalent(sched, rt) {
            merged.push(merge_stop_time_updates(&sched.update, &rt.update));
            si += 1;
            ri += 1;
            continue;
        }

        // Where, if anywhere, does each head pair up on the other side?
        let matching_rt = realtime[ri..]
            .iter()
            .position(|candidate| equivalence.equivalent(sched, candidate));
        let matching_sched = schedule[si..]
            .iter()
            .position(|candidate| equivalence.equivalent(rt, candidate));

        // A match further down the other queue means the entries before
        // it exist only on that side; emit them to let it catch up.
        if matches!(matching_rt, Some(i) if i > 0) {
            merged.push(rt.update.clone());
            ri += 1;
            continue;
        }
        if matches!(matching_sched, Some(i) if i > 0) {
            merged.push(sched.update.clone());
            si += 1;
            continue;
        }

        match (matching_rt, matching_sched) {
            (None, None) => {
                if let (Some(rt_seq), Some(sched_seq)) =
                    (rt.update.stop_sequence, sched.update.stop_sequence)
                {
                    if rt_seq < sched_seq {
                        merged.push(rt.update.clone());
                        ri += 1;
                    } else {
                        merged.push(sched.update.clone());
                        si += 1;
                    }
                    continue;
                }
                let rt_arrival = rt.update.arrival.as_ref().and_then(|event| event.time);
                let sched_arrival = sched.update.arrival.as_ref().and_then(|event| event.time);
                if let (Some(rt_time), Some(sched_time)) = (rt_arrival, sched_arrival) {
                    if rt_time < sched_time {
                        merged.push(rt.update.clone());
                        ri += 1;
                    } else {
                        merged.push(sched.update.clone());
                        si += 1;
                    }
                    continue;
                }
                let rt_departure = rt.update.departure.as_ref().and_then(|event| event.time);
                let sched_departure =
                    sched.update.departure.as_ref().and_then(|event| event.time);
                if let (Some(rt_time), Some(sched_time)) = (rt_departure, sched_departure) {
                    if rt_time < sched_time {
                        merged.push(rt.update.clone());
                        ri += 1;
                    } else {
                        merged.push(sched.update.clone());
                        si += 1;
                    }
                    continue;
                }
                merged.push(sched.update.clone());
                si += 1;
            }
            (None, Some(_)) => {
                merged.push(sched.update.clone());
                si += 1;
            }
            (Some(_), _) => {
                merged.push(rt.update.clone());
                ri += 1;
            }
        }
    }
    merged
}

/// Merges the two assembled views of one trip into the published update.
pub fn merge_trip_updates(
    schedule: &AnnotatedTripUpdate,
    realtime: &AnnotatedTripUpdate,
    equivalence: &Equivalence,
) -> TripUpdate {
    TripUpdate {
        trip: merge_trip_descriptors(&schedule.trip, &realtime.trip),
        stop_time_update: combine_stop_time_updates(
            &schedule.stop_time_updates,
            &realtime.stop_time_updates,
            equivalence,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(time: i64) -> StopTimeEvent {
        StopTimeEvent {
            time: Some(time),
            delay: None,
        }
    }

    fn delayed(time: i64, delay: i32) -> StopTimeEvent {
        StopTimeEvent {
            time: Some(time),
            delay: Some(delay),
        }
    }

    fn stu(
        stop_sequence: Option<u32>,
        stop_id: &str,
        arrival: Option<StopTimeEvent>,
        departure: Option<StopTimeEvent>,
    ) -> StopTimeUpdate {
        StopTimeUpdate {
            stop_sequence,
            stop_id: Some(stop_id.to_string()),
            arrival,
            departure,
            schedule_relationship: None,
        }
    }

    #[test]
    fn scheduled_time_backs_out_the_delay() {
        assert_eq!(
            scheduled_time(Some(&delayed(1_738_275_000, 180))),
            Some(1_738_274_820)
        );
        assert_eq!(scheduled_time(Some(&event(1_738_275_000))), Some(1_738_275_000));
        assert_eq!(
            scheduled_time(Some(&StopTimeEvent {
                time: None,
                delay: Some(60)
            })),
            None
        );
        assert_eq!(scheduled_time(None), None);
    }

    #[test]
    fn merging_two_updates_prefers_realtime_fields_but_schedule_ids() {
        let schedule = stu(Some(12), "some-schedule-id", None, Some(event(2345)));
        let realtime = StopTimeUpdate {
            stop_sequence: None,
            stop_id: Some("some-realtime-id".to_string()),
            arrival: Some(delayed(1234, 0)),
            departure: Some(delayed(2344, -1)),
            schedule_relationship: None,
        };
        assert_eq!(
            merge_stop_time_updates(&schedule, &realtime),
            StopTimeUpdate {
                stop_sequence: Some(12),
                stop_id: Some("some-schedule-id".to_string()),
                arrival: Some(delayed(1234, 0)),
                departure: Some(delayed(2344, -1)),
                schedule_relationship: None,
            }
        );
    }

    #[test]
    fn events_replace_wholesale_rather_than_field_by_field() {
        // A realtime event without a delay must not inherit the
        // schedule's; the event is one fact, not two.
        let schedule = stu(None, "x", Some(delayed(1000, 600)), None);
        let realtime = stu(None, "x", Some(event(900)), None);
        let merged = merge_stop_time_updates(&schedule, &realtime);
        assert_eq!(merged.arrival, Some(event(900)));
    }

    #[test]
    fn descriptors_merge_field_by_field_ignoring_absent_values() {
        let schedule = TripDescriptor {
            trip_id: Some("1".to_string()),
            route_id: Some("2".to_string()),
            direction_id: Some(0),
            start_time: None,
            start_date: None,
            schedule_relationship: Some(crate::domain::TripScheduleRelationship::Scheduled),
        };
        let realtime = TripDescriptor {
            trip_id: None,
            route_id: Some("3".to_string()),
            direction_id: None,
            start_time: None,
            start_date: Some("4".to_string()),
            schedule_relationship: None,
        };
        assert_eq!(
            merge_trip_descriptors(&schedule, &realtime),
            TripDescriptor {
                trip_id: Some("1".to_string()),
                route_id: Some("3".to_string()),
                direction_id: Some(0),
                start_time: None,
                start_date: Some("4".to_string()),
                schedule_relationship: Some(crate::domain::TripScheduleRelationship::Scheduled),
            }
        );
    }

    #[test]
    fn equivalence_requires_a_stop_id_on_the_first_side() {
        let eq = Equivalence::new();
        let without_id = AnnotatedStopTimeUpdate::from(StopTimeUpdate {
            stop_sequence: None,
            stop_id: None,
            arrival: None,
            departure: Some(event(1000)),
            schedule_relationship: None,
        });
        let with_id = AnnotatedStopTimeUpdate::from(stu(None, "A", None, Some(event(1000))));
        assert!(!eq.equivalent(&without_id, &with_id));
        // With the id present on the first side the same pair matches.
        let first = AnnotatedStopTimeUpdate::from(stu(None, "A", None, Some(event(1000))));
        assert!(eq.equivalent(&first, &with_id));
    }

    #[test]
    fn equivalence_requires_a_scheduled_time_on_the_first_side() {
        let eq = Equivalence::new();
        let timeless = AnnotatedStopTimeUpdate::from(stu(None, "A", None, None));
        let timed = AnnotatedStopTimeUpdate::from(stu(None, "A", None, Some(event(1000))));
        assert!(!eq.equivalent(&timeless, &timed));
    }

    #[test]
    fn nearby_stops_pair_up_without_matching_ids() {
        let eq = Equivalence::new();
        let mut first = AnnotatedStopTimeUpdate::from(stu(None, "feed-a:1", None, Some(event(1000))));
        first.context.coordinates = Some(Point::new(10.0, 48.0));
        let mut second =
            AnnotatedStopTimeUpdate::from(stu(None, "feed-b:1", None, Some(event(1000))));
        // Roughly 50 meters north.
        second.context.coordinates = Some(Point::new(10.0, 48.00045));
        assert!(eq.equivalent(&first, &second));

        // Same scheduled time, but 500 meters apart and still no
        // matching id or name: no pair.
        let mut far = second.clone();
        far.context.coordinates = Some(Point::new(10.0, 48.0045));
        assert!(!eq.equivalent(&first, &far));
    }

    #[test]
    fn matching_normalized_names_substitute_for_ids() {
        let eq = Equivalence::new();
        let mut first = AnnotatedStopTimeUpdate::from(stu(None, "feed-a:1", None, Some(event(1000))));
        first.context.normalized_stop_name = Some("tapfheim".to_string());
        let mut second =
            AnnotatedStopTimeUpdate::from(stu(None, "feed-b:1", None, Some(event(1000))));
        second.context.normalized_stop_name = Some("tapfheim".to_string());
        assert!(eq.equivalent(&first, &second));
    }

    #[test]
    fn fuzzy_times_tolerate_small_deviations() {
        let eq = Equivalence::new().with_fuzzy_times();
        let first = AnnotatedStopTimeUpdate::from(stu(None, "A", None, Some(event(1000))));
        let close = AnnotatedStopTimeUpdate::from(stu(None, "A", None, Some(event(1059))));
        let too_far = AnnotatedStopTimeUpdate::from(stu(None, "A", None, Some(event(1061))));
        assert!(eq.equivalent(&first, &close));
        assert!(!eq.equivalent(&first, &too_far));

        let exact = Equivalence::new();
        assert!(!exact.equivalent(&first, &close));
    }

    fn trimmed_ids_equal(a: &AnnotatedStopTimeUpdate, b: &AnnotatedStopTimeUpdate) -> bool {
        match (a.update.stop_id.as_deref(), b.update.stop_id.as_deref()) {
            (Some(a), Some(b)) => a.trim() == b.trim(),
            _ => false,
        }
    }

    #[test]
    fn combines_overlapping_sequences_around_their_shared_stops() {
        let schedule: Vec<AnnotatedStopTimeUpdate> = vec![
            stu(Some(2), "B", Some(event(2000)), Some(event(3000))).into(),
            stu(Some(4), "D ", Some(event(6000)), Some(event(7000))).into(),
            stu(Some(5), "E", Some(event(8000)), Some(event(8000))).into(),
        ];
        let realtime: Vec<AnnotatedStopTimeUpdate> = vec![
            stu(None, "A", None, Some(event(1000))).into(),
            stu(None, "B", Some(delayed(2100, 100)), Some(delayed(3050, 50))).into(),
            stu(None, "C", Some(event(4000)), Some(delayed(5010, 10))).into(),
            stu(None, " D", Some(delayed(6000, 0)), Some(delayed(7020, 20))).into(),
            stu(None, "F", Some(delayed(8980, -20)), Some(delayed(10010, 10))).into(),
            stu(None, "G", Some(delayed(10080, -20)), None).into(),
        ];

        let eq = Equivalence::new().with_stop_id_equality(trimmed_ids_equal);
        let combined = combine_stop_time_updates(&schedule, &realtime, &eq);

        assert_eq!(
            combined,
            vec![
                stu(None, "A", None, Some(event(1000))),
                stu(Some(2), "B", Some(delayed(2100, 100)), Some(delayed(3050, 50))),
                stu(None, "C", Some(event(4000)), Some(delayed(5010, 10))),
                stu(Some(4), "D ", Some(delayed(6000, 0)), Some(delayed(7020, 20))),
                stu(Some(5), "E", Some(event(8000)), Some(event(8000))),
                stu(None, "F", Some(delayed(8980, -20)), Some(delayed(10010, 10))),
                stu(None, "G", Some(delayed(10080, -20)), None),
            ]
        );
    }

    #[test]
    fn one_empty_side_passes_the_other_through() {
        let sched: Vec<AnnotatedStopTimeUpdate> =
            vec![stu(Some(1), "A", None, Some(event(1000))).into()];
        let eq = Equivalence::new();
        assert_eq!(
            combine_stop_time_updates(&sched, &[], &eq),
            vec![stu(Some(1), "A", None, Some(event(1000)))]
        );
        assert_eq!(
            combine_stop_time_updates(&[], &sched, &eq),
            vec![stu(Some(1), "A", None, Some(event(1000)))]
        );
    }

    #[test]
    fn merges_whole_trip_updates() {
        let schedule = AnnotatedTripUpdate {
            trip: TripDescriptor {
                trip_id: Some("trip-a".to_string()),
                route_id: Some("route-44".to_string()),
                direction_id: Some(0),
                start_time: Some("14:47:00".to_string()),
                start_date: Some("20250128".to_string()),
                schedule_relationship: Some(crate::domain::TripScheduleRelationship::Scheduled),
            },
            stop_time_updates: vec![stu(Some(1), "A", None, Some(event(1000))).into()],
        };
        let realtime = AnnotatedTripUpdate {
            trip: TripDescriptor::default(),
            stop_time_updates: vec![stu(None, "A", None, Some(delayed(1060, 60))).into()],
        };

        let merged = merge_trip_updates(&schedule, &realtime, &Equivalence::new());
        assert_eq!(merged.trip.trip_id.as_deref(), Some("trip-a"));
        assert_eq!(merged.trip.start_date.as_deref(), Some("20250128"));
        assert_eq!(
            merged.stop_time_update,
            vec![stu(Some(1), "A", None, Some(delayed(1060, 60)))]
        );
    }
}
