//! Deterministic clock context consumed by the absolute resolver. Pure and
//! side-effect free: given an instant and a zone it is fully determined.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike};
use chrono_tz::Tz;

#[derive(Debug, Clone)]
pub struct ClockContext {
    pub now: DateTime<Tz>,
    pub timezone: Tz,
    pub today_human: String,
    pub end_of_today: DateTime<Tz>,
    pub end_of_week: DateTime<Tz>,
    pub end_of_month: DateTime<Tz>,
    pub next_monday: DateTime<Tz>,
    /// Monday..Sunday -> date of its next occurrence, in Monday..Sunday order.
    /// `chrono::Weekday` has no `Ord`, so this is a `Vec` of pairs rather
    /// than a map; look up a specific day with `.iter().find(...)`.
    pub next_occurrences: Vec<(chrono::Weekday, DateTime<Tz>)>,
}

const WEEKDAYS: [chrono::Weekday; 7] = [
    chrono::Weekday::Mon,
    chrono::Weekday::Tue,
    chrono::Weekday::Wed,
    chrono::Weekday::Thu,
    chrono::Weekday::Fri,
    chrono::Weekday::Sat,
    chrono::Weekday::Sun,
];

fn at_time(d: DateTime<Tz>, hour: u32, minute: u32, second: u32) -> DateTime<Tz> {
    d.with_hour(hour)
        .and_then(|d| d.with_minute(minute))
        .and_then(|d| d.with_second(second))
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(d)
}

/// Build the clock context for `now` in `timezone`. `now` is expected to
/// already be in UTC or any zone; it is converted to `timezone` first.
pub fn context_for(now: DateTime<chrono::Utc>, timezone: Tz) -> ClockContext {
    let now = now.with_timezone(&timezone);
    context_for_local(now, timezone)
}

/// Variant that takes an already-localized instant directly, used by tests
/// that want to pin a specific wall-clock moment without going through UTC.
pub fn context_for_local(now: DateTime<Tz>, timezone: Tz) -> ClockContext {
    let today_human = now.format("%A, %B %d, %Y").to_string();
    let end_of_today = at_time(now, 23, 59, 0);

    let mut days_until_sunday = (7 - now.weekday().num_days_from_monday() + 6) % 7;
    if days_until_sunday == 0 && now.hour() >= 23 && now.minute() >= 59 {
        // Already at or past end-of-week today; roll to next week's Sunday.
        days_until_sunday = 7;
    }
    let end_of_week = at_time(now + Duration::days(days_until_sunday as i64), 23, 59, 0);

    let (next_year, next_month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    let first_of_next_month = timezone
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .unwrap_or(now);
    let end_of_month = at_time(first_of_next_month - Duration::days(1), 23, 59, 0);

    let days_until_monday = (7 - now.weekday().num_days_from_monday()) % 7;
    let days_until_monday = if days_until_monday == 0 { 7 } else { days_until_monday };
    let next_monday = at_time(now + Duration::days(days_until_monday as i64), 9, 0, 0);

    let mut next_occurrences = Vec::with_capacity(WEEKDAYS.len());
    for &wd in WEEKDAYS.iter() {
        let delta = (7 + wd.num_days_from_monday() as i64 - now.weekday().num_days_from_monday() as i64) % 7;
        let delta = if delta == 0 { 7 } else { delta };
        next_occurrences.push((wd, now + Duration::days(delta)));
    }

    ClockContext {
        now,
        timezone,
        today_human,
        end_of_today,
        end_of_week,
        end_of_month,
        next_monday,
        next_occurrences,
    }
}
