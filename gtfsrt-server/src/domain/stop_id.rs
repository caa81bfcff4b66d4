//! Composite timetable stop identifiers.
//!
//! Every realtime message carries a `raw_id` of the form
//! `<tripId>-<tripStart>-<stopSequence>`, e.g.
//! `2868854051011682435-2501281447-13`. The trip id is opaque and never
//! contains `-`, the trip start is a ten-digit local timestamp and the
//! stop sequence counts all stops of the trip including service stops.
//! Ids are also used as storage keys, so the formatted and parsed forms
//! must round-trip exactly.

use std::cmp::Ordering;

use chrono::DateTime;
use chrono_tz::Tz;

use super::time::{format_iris_datetime, parse_iris_datetime};

/// Error when a string is not a valid composite timetable stop id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid timetable stop id: {reason}")]
pub struct InvalidStopId {
    reason: &'static str,
}

impl InvalidStopId {
    fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}

/// A fully parsed composite timetable stop id.
///
/// # Examples
///
/// ```
/// use gtfsrt_server::domain::TimetableStopId;
///
/// let id = TimetableStopId::parse("2868854051011682435-2501281447-13").unwrap();
/// assert_eq!(id.trip_id(), "2868854051011682435");
/// assert_eq!(id.stop_sequence(), 13);
/// assert_eq!(id.format(), "2868854051011682435-2501281447-13");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimetableStopId {
    trip_id: String,
    trip_start: DateTime<Tz>,
    stop_sequence: u32,
}

impl TimetableStopId {
    pub fn parse(id: &str) -> Result<Self, InvalidStopId> {
        let (trip_id, start_str, seq_str) = split_components(id)?;
        let chars = trip_id.chars().count();
        if !(3..=100).contains(&chars) {
            return Err(InvalidStopId::new("trip id must be 3 to 100 characters"));
        }
        let trip_start = parse_iris_datetime(start_str)
            .ok_or_else(|| InvalidStopId::new("trip start is not a valid timestamp"))?;
        let stop_sequence = seq_str
            .parse()
            .map_err(|_| InvalidStopId::new("stop sequence is not a number"))?;
        Ok(Self {
            trip_id: trip_id.to_string(),
            trip_start,
            stop_sequence,
        })
    }

    pub fn trip_id(&self) -> &str {
        &self.trip_id
    }

    pub fn trip_start(&self) -> DateTime<Tz> {
        self.trip_start
    }

    pub fn stop_sequence(&self) -> u32 {
        self.stop_sequence
    }

    pub fn format(&self) -> String {
        format!(
            "{}-{}-{}",
            self.trip_id,
            format_iris_datetime(&self.trip_start),
            self.stop_sequence
        )
    }
}

/// A prefix of a composite stop id, used to address ranges of stored items.
///
/// Three shapes exist: trip only (`id-`), trip and start (`id-ts-`) and
/// the full id. A stop sequence without a trip start has no meaningful
/// string form and is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialStopId {
    trip_id: String,
    trip_start: Option<DateTime<Tz>>,
    stop_sequence: Option<u32>,
}

impl PartialStopId {
    pub fn new(
        trip_id: &str,
        trip_start: Option<DateTime<Tz>>,
        stop_sequence: Option<u32>,
    ) -> Result<Self, InvalidStopId> {
        if trip_id.is_empty() {
            return Err(InvalidStopId::new("trip id must not be empty"));
        }
        if trip_id.contains('-') {
            return Err(InvalidStopId::new("trip id must not contain `-`"));
        }
        if stop_sequence.is_some() && trip_start.is_none() {
            return Err(InvalidStopId::new(
                "stop sequence requires a trip start",
            ));
        }
        Ok(Self {
            trip_id: trip_id.to_string(),
            trip_start,
            stop_sequence,
        })
    }

    pub fn trip(trip_id: &str) -> Result<Self, InvalidStopId> {
        Self::new(trip_id, None, None)
    }

    pub fn trip_at_start(trip_id: &str, trip_start: DateTime<Tz>) -> Result<Self, InvalidStopId> {
        Self::new(trip_id, Some(trip_start), None)
    }

    /// Formats the id prefix; partial shapes keep the trailing `-` so the
    /// result is usable as a key-range prefix.
    pub fn format(&self) -> String {
        match (&self.trip_start, self.stop_sequence) {
            (None, _) => format!("{}-", self.trip_id),
            (Some(start), None) => {
                format!("{}-{}-", self.trip_id, format_iris_datetime(start))
            }
            (Some(start), Some(seq)) => {
                format!("{}-{}-{}", self.trip_id, format_iris_datetime(start), seq)
            }
        }
    }
}

/// Orders two raw ids by stop sequence.
///
/// Ids that do not parse are incomparable and compare as equal, so
/// sorting never fails on odd input, it just leaves such items in place.
///
/// # Examples
///
/// ```
/// use std::cmp::Ordering;
/// use gtfsrt_server::domain::compare_by_sequence;
///
/// let a = "2868854051011682435-2501281447-2";
/// let b = "2868854051011682435-2501281447-13";
/// assert_eq!(compare_by_sequence(a, b), Ordering::Less);
///
/// let c = "2868854051011682435-2501281447-abc";
/// assert_eq!(compare_by_sequence(a, c), Ordering::Equal);
/// ```
pub fn compare_by_sequence(a: &str, b: &str) -> Ordering {
    match (TimetableStopId::parse(a), TimetableStopId::parse(b)) {
        (Ok(a), Ok(b)) => a.stop_sequence.cmp(&b.stop_sequence),
        _ => Ordering::Equal,
    }
}

/// Derives the trip-instance range (`tripId-tripStart-`) owning a raw id.
///
/// Splits structurally without enforcing the trip-id length rule, so
/// items whose trip id is shorter than usual still group correctly.
pub fn trip_instance_range(raw_id: &str) -> Option<PartialStopId> {
    let (trip_id, start_str, _) = split_components(raw_id).ok()?;
    let trip_start = parse_iris_datetime(start_str)?;
    PartialStopId::trip_at_start(trip_id, trip_start).ok()
}

fn split_components(id: &str) -> Result<(&str, &str, &str), InvalidStopId> {
    let (head, seq_str) = id
        .rsplit_once('-')
        .ok_or_else(|| InvalidStopId::new("missing component separators"))?;
    if seq_str.is_empty() || seq_str.len() > 3 || !all_ascii_digits(seq_str) {
        return Err(InvalidStopId::new("stop sequence must be 1 to 3 digits"));
    }
    let (trip_id, start_str) = head
        .rsplit_once('-')
        .ok_or_else(|| InvalidStopId::new("missing trip start component"))?;
    if start_str.len() != 10 || !all_ascii_digits(start_str) {
        return Err(InvalidStopId::new("trip start must be 10 digits"));
    }
    if trip_id.is_empty() || trip_id.contains('-') {
        return Err(InvalidStopId::new("trip id must not contain `-`"));
    }
    Ok((trip_id, start_str, seq_str))
}

fn all_ascii_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
