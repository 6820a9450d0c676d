//! Epoch timestamp formatting for cards, table rows and chart axes.

use chrono::{DateTime, Local, TimeZone};

/// Display format of a reading time
pub const DATE_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Format epoch seconds as `YYYY/MM/DD HH:MM:SS` in local time.
///
/// Timestamps outside chrono's representable range yield an empty string.
pub fn to_date_time(epoch_seconds: i64) -> String {
    to_date_time_in(epoch_seconds, &Local)
}

/// Format epoch seconds as `YYYY/MM/DD HH:MM:SS` in the given time zone
pub fn to_date_time_in<Tz>(epoch_seconds: i64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    DateTime::from_timestamp(epoch_seconds, 0)
        .map(|utc| utc.with_timezone(tz).format(DATE_TIME_FORMAT).to_string())
        .unwrap_or_default()
}

/// Chart x-axis position (milliseconds since epoch)
pub fn to_axis_time(epoch_seconds: i64) -> i64 {
    epoch_seconds.saturating_mul(1000)
}
