//! Civil-time handling for realtime messages.
//!
//! The upstream dispatch system reports timestamps as ten-digit
//! `yyMMddHHmm` strings in local German time, and service days as ISO
//! dates. Everything downstream works with timezone-aware instants, so
//! both formats are parsed exactly once, here.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Europe::Berlin;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Timezone all wall-clock fields of the upstream feed are expressed in.
pub const DB_TIMEZONE: Tz = Berlin;

/// Parses a ten-digit `yyMMddHHmm` local timestamp.
///
/// Ambiguous wall-clock times (the repeated hour when daylight saving
/// time ends) resolve to the earlier instant. Returns `None` for
/// malformed input and for wall-clock times that do not exist.
///
/// # Examples
///
/// ```
/// use chrono::TimeZone;
/// use gtfsrt_server::domain::{parse_iris_datetime, DB_TIMEZONE};
///
/// let parsed = parse_iris_datetime("2501281447").unwrap();
/// assert_eq!(
///     parsed,
///     DB_TIMEZONE.with_ymd_and_hms(2025, 1, 28, 14, 47, 0).unwrap()
/// );
/// ```
pub fn parse_iris_datetime(s: &str) -> Option<DateTime<Tz>> {
    if s.len() != 10 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(s, "%y%m%d%H%M").ok()?;
    DB_TIMEZONE.from_local_datetime(&naive).earliest()
}

/// Formats an instant back into the ten-digit local timestamp format.
pub fn format_iris_datetime(datetime: &DateTime<Tz>) -> String {
    datetime
        .with_timezone(&DB_TIMEZONE)
        .format("%y%m%d%H%M")
        .to_string()
}

/// Operating day of a trip, as reported alongside every realtime message.
///
/// A service day is a plain calendar date; where an instant is needed the
/// day starts at local midnight, see [`ServiceDate::start_of_day`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ServiceDate(NaiveDate);

impl ServiceDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Parses the ISO `2025-01-28` form used on the wire.
    pub fn parse(s: &str) -> Option<Self> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Midnight at the start of this service day in the feed timezone.
    ///
    /// `None` only for dates whose local midnight does not exist, which
    /// cannot happen for the feed timezone.
    pub fn start_of_day(&self) -> Option<DateTime<Tz>> {
        DB_TIMEZONE
            .from_local_datetime(&self.0.and_time(NaiveTime::MIN))
            .earliest()
    }
}

impl std::fmt::Display for ServiceDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Strategy producing valid local instants, shared by property tests of
/// modules that embed formatted timestamps.
#[cfg(test)]
pub(crate) fn proptest_local_datetimes()
-> impl proptest::strategy::Strategy<Value = DateTime<Tz>> {
    use proptest::prelude::*;

    (2020..=2030i32, 1..=12u32, 1..=28u32, 0..=23u32, 0..=59u32).prop_filter_map(
        "wall-clock time must exist",
        |(y, m, d, h, min)| DB_TIMEZONE.with_ymd_and_hms(y, m, d, h, min, 0).earliest(),
    )
}
