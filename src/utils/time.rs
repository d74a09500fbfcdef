//! Time and date-window utilities
//!
//! Timestamps are persisted as Unix seconds. Calendar dates coming from
//! callers (`YYYY-MM-DD`) are interpreted in one fixed UTC offset configured
//! at startup; there is no timezone auto-detection.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};

use crate::error::{AppError, AppResult};

/// Get current Unix timestamp in seconds
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert a stored Unix timestamp back to UTC
pub fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Parse a strict `YYYY-MM-DD` date
pub fn parse_date(value: &str) -> AppResult<NaiveDate> {
    let well_formed = value.len() == 10
        && value
            .bytes()
            .enumerate()
            .all(|(i, b)| if i == 4 || i == 7 { b == b'-' } else { b.is_ascii_digit() });
    if !well_formed {
        return Err(AppError::invalid(format!(
            "date '{}' must be formatted as YYYY-MM-DD",
            value
        )));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::invalid(format!("date '{}' is not a calendar date", value)))
}

/// Parse a UTC offset such as `+08:00`, `-05:30` or `Z`
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset, String> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return Ok(utc_offset());
    }

    let (sign, rest) = if let Some(rest) = value.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = value.strip_prefix('-') {
        (-1, rest)
    } else {
        return Err(format!("offset '{}' must start with '+' or '-'", value));
    };
    let (hours, minutes) = rest
        .split_once(':')
        .ok_or_else(|| format!("offset '{}' must look like +HH:MM", value))?;
    let hours: i32 = hours
        .parse()
        .map_err(|_| format!("invalid hours in offset '{}'", value))?;
    let minutes: i32 = minutes
        .parse()
        .map_err(|_| format!("invalid minutes in offset '{}'", value))?;
    if hours > 14 || minutes > 59 {
        return Err(format!("offset '{}' is out of range", value));
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| format!("offset '{}' is out of range", value))
}

pub fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// Inclusive `[start, end]` window in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    /// Whole history up to `now`
    pub fn all_time(now: DateTime<Utc>) -> Self {
        Self {
            start: DateTime::<Utc>::UNIX_EPOCH,
            end: now,
        }
    }

    /// Build a window from optional `YYYY-MM-DD` bounds.
    ///
    /// The start date begins at local midnight and the end date runs through
    /// 23:59:59 local time; a missing start means the epoch and a missing end
    /// means `now`.
    pub fn from_dates(
        start_date: Option<&str>,
        end_date: Option<&str>,
        offset: FixedOffset,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        let start = match non_empty(start_date) {
            Some(s) => start_of_day(parse_date(s)?, offset),
            None => DateTime::<Utc>::UNIX_EPOCH,
        };
        let end = match non_empty(end_date) {
            Some(s) => end_of_day(parse_date(s)?, offset),
            None => now,
        };

        if start > end {
            return Err(AppError::invalid(format!(
                "start_date {} is after end_date {}",
                start.with_timezone(&offset).date_naive(),
                end.with_timezone(&offset).date_naive()
            )));
        }
        Ok(Self { start, end })
    }

    /// Window from local midnight `days` days before today up to `now`
    pub fn last_days(days: i64, offset: FixedOffset, now: DateTime<Utc>) -> Self {
        let today = now.with_timezone(&offset).date_naive();
        let first = today - Duration::days(days);
        Self {
            start: start_of_day(first, offset),
            end: now,
        }
    }

    pub fn start_secs(&self) -> i64 {
        self.start.timestamp()
    }

    pub fn end_secs(&self) -> i64 {
        self.end.timestamp()
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn start_of_day(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    local_to_utc(date.and_time(NaiveTime::MIN), offset)
}

fn end_of_day(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let last_second = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    local_to_utc(date.and_time(last_second), offset)
}

fn local_to_utc(local: chrono::NaiveDateTime, offset: FixedOffset) -> DateTime<Utc> {
    // A fixed offset has no gaps or folds, so the mapping is always single.
    offset
        .from_local_datetime(&local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&local))
}
