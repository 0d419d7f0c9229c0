//! Time-of-day arithmetic over 12-hour clock labels such as `4:41 AM`.
//!
//! The base schedule stores bare `H:MM` labels; Iftar labels carry no period
//! marker and are implicitly in the evening, which callers signal with
//! `is_pm`. Arithmetic wraps around midnight and never touches a calendar
//! date.

use chrono::{Duration, NaiveTime, Timelike};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeParseError {
    #[error("empty time label")]
    Empty,
    #[error("malformed time label `{0}`")]
    Malformed(String),
    #[error("time label `{0}` is out of range")]
    OutOfRange(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Period {
    Am,
    Pm,
}

/// Parse a clock label into a time of day.
///
/// Labels with an `AM`/`PM` suffix are read as 12-hour times. Bare labels are
/// read as given, then pushed into the afternoon when `is_pm` is set and the
/// hour is still before noon.
pub fn parse_label(label: &str, is_pm: bool) -> Result<NaiveTime, TimeParseError> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return Err(TimeParseError::Empty);
    }

    let (clock, period) = split_period(trimmed);
    let (hour_part, minute_part) = clock
        .split_once(':')
        .ok_or_else(|| TimeParseError::Malformed(trimmed.to_string()))?;
    let mut hour: u32 = hour_part
        .trim()
        .parse()
        .map_err(|_| TimeParseError::Malformed(trimmed.to_string()))?;
    let minute: u32 = minute_part
        .trim()
        .parse()
        .map_err(|_| TimeParseError::Malformed(trimmed.to_string()))?;

    match period {
        Some(_) if hour == 0 || hour > 12 => {
            return Err(TimeParseError::OutOfRange(trimmed.to_string()));
        }
        Some(Period::Am) if hour == 12 => hour = 0,
        Some(Period::Pm) if hour != 12 => hour += 12,
        _ => {}
    }
    if is_pm && hour < 12 {
        hour += 12;
    }

    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| TimeParseError::OutOfRange(trimmed.to_string()))
}

/// Render a time of day as `H:MM AM`/`H:MM PM`.
pub fn format_label(time: NaiveTime) -> String {
    let (is_pm, hour) = time.hour12();
    let period = if is_pm { "PM" } else { "AM" };
    format!("{}:{:02} {}", hour, time.minute(), period)
}

/// Shift a clock label by `delta_minutes`, wrapping across midnight.
pub fn add_minutes(label: &str, delta_minutes: i64, is_pm: bool) -> Result<String, TimeParseError> {
    let time = parse_label(label, is_pm)?;
    let (shifted, _) = time.overflowing_add_signed(Duration::minutes(delta_minutes));
    Ok(format_label(shifted))
}

fn split_period(label: &str) -> (&str, Option<Period>) {
    let upper = label.to_ascii_uppercase();
    if upper.ends_with("AM") {
        (label[..label.len() - 2].trim_end(), Some(Period::Am))
    } else if upper.ends_with("PM") {
        (label[..label.len() - 2].trim_end(), Some(Period::Pm))
    } else {
        (label, None)
    }
}
