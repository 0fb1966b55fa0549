use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};

/// Truncates a timestamp to the start of its minute. Every reading in the
/// store carries a truncated timestamp so that fan-in can group on exact
/// equality.
pub fn minute_floor(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// The most recently completed minute boundary before `now`.
pub fn last_completed_minute(now: DateTime<Utc>) -> DateTime<Utc> {
    minute_floor(now) - Duration::minutes(1)
}

/// Half-open UTC range covering one civil day: [00:00, next day 00:00).
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    (start, start + Duration::days(1))
}

/// A closed calendar-month window ending on the day before the gate date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthSpan {
    pub year: i32,
    pub month: u32,
    pub first: NaiveDate,
    pub last: NaiveDate,
}

/// Returns the month that `today` just closed out, or `None` unless
/// `today` is the first of a month. Monthly rollups only run through
/// this gate, so the span always ends on yesterday.
pub fn previous_month(today: NaiveDate) -> Option<MonthSpan> {
    if today.day() != 1 {
        return None;
    }
    let last = today.pred_opt()?;
    let first = last.with_day(1)?;
    Some(MonthSpan { year: last.year(), month: last.month(), first, last })
}
