//! Time Standardizer: a pure function from `Resolution` + timezone + `NOW`
//! to `Standardized`. No I/O, no LLM call — this is the one stage that is
//! fully deterministic given its inputs, and it is tested as a pure
//! function rather than only end-to-end.

use crate::error::TsError;
use crate::types::{Resolution, Standardized};
use chrono::{DateTime, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

const CANONICAL_FMT: &str = "%B %d, %Y %I:%M %p";

fn parse_canonical(text: &str, tz: Tz) -> Result<DateTime<Tz>, TsError> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, CANONICAL_FMT) {
        return Ok(localize(naive, tz));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&tz));
    }
    Err(TsError::UnparseableDatetime(text.to_string()))
}

fn localize(naive: NaiveDateTime, tz: Tz) -> DateTime<Tz> {
    tz.from_local_datetime(&naive)
        .single()
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}

fn is_end_of_day_intent(text: &str) -> bool {
    text.to_lowercase().trim_end().ends_with("11:59 pm")
}

fn with_seconds(dt: DateTime<Tz>, seconds: u32) -> DateTime<Tz> {
    use chrono::Timelike;
    dt.with_second(seconds).unwrap_or(dt)
}

fn with_date_of(dt: DateTime<Tz>, date_source: DateTime<Tz>) -> DateTime<Tz> {
    use chrono::{Datelike, Timelike};
    dt.timezone()
        .with_ymd_and_hms(
            date_source.year(),
            date_source.month(),
            date_source.day(),
            dt.hour(),
            dt.minute(),
            dt.second(),
        )
        .single()
        .unwrap_or(dt)
}

fn end_of_day_on(dt: DateTime<Tz>, seconds: u32) -> DateTime<Tz> {
    use chrono::{Datelike, Timelike};
    let _ = dt.hour();
    dt.timezone()
        .with_ymd_and_hms(dt.year(), dt.month(), dt.day(), 23, 59, seconds)
        .single()
        .unwrap_or(dt)
}

/// Standardize a resolved `{start_text, end_text, duration}` relative to
/// `now` in `tz`. Applies the past-time adjustment and the final repair
/// rule, and normalizes `duration` to ISO-8601.
pub fn standardize(resolution: &Resolution, tz: Tz, now: DateTime<Tz>) -> Result<Standardized, TsError> {
    let mut start = parse_canonical(&resolution.start_text, tz)?;
    let mut end = parse_canonical(&resolution.end_text, tz)?;

    let end_seconds = if is_end_of_day_intent(&resolution.end_text) { 59 } else { 0 };
    end = with_seconds(end, end_seconds);

    // Past-time adjustment, relative to `now`.
    if start < now && end >= now {
        start = now;
    } else if start < now && end < now {
        start = start + chrono::Duration::days(1);
        end = end + chrono::Duration::days(1);
    } else if start >= now && end < now {
        end = with_date_of(end, start);
    }

    if start > end {
        end = end_of_day_on(start, 59);
    }

    let duration = resolution.duration.as_deref().and_then(normalize_duration);

    Ok(Standardized { start, end, duration })
}

static COMPOUND_HM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(\d+)\s*h(?:r|our)?s?\s*(\d+)\s*m(?:in(?:ute)?s?)?\s*$").unwrap()
});
static HOURS_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?)\s*h(?:r|our)?s?\s*$").unwrap());
static MINUTES_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(\d+)\s*m(?:in(?:ute)?s?)?\s*$").unwrap());

/// Normalize a free-text duration phrase to ISO-8601 (`PT...`). Returns
/// `None` if the phrase cannot be parsed.
pub fn normalize_duration(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let lowered = trimmed.to_lowercase();

    match lowered.as_str() {
        "half an hour" | "half hour" => return Some("PT30M".to_string()),
        "an hour" | "one hour" => return Some("PT1H".to_string()),
        _ => {}
    }

    if let Some(caps) = COMPOUND_HM.captures(trimmed) {
        let h: u32 = caps[1].parse().ok()?;
        let m: u32 = caps[2].parse().ok()?;
        return Some(format!("PT{h}H{m}M"));
    }

    if let Some(caps) = HOURS_ONLY.captures(trimmed) {
        let hours: f64 = caps[1].parse().ok()?;
        let whole = hours.trunc() as u32;
        let frac_minutes = ((hours.fract()) * 60.0).round() as u32;
        return Some(if frac_minutes > 0 {
            format!("PT{whole}H{frac_minutes}M")
        } else {
            format!("PT{whole}H")
        });
    }

    if let Some(caps) = MINUTES_ONLY.captures(trimmed) {
        let m: u32 = caps[1].parse().ok()?;
        return Some(format!("PT{m}M"));
    }

    None
}
