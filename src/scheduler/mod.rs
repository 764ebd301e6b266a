//! The constrained ordered scheduler. Three pure layers, kept separate per
//! the design notes: free-slot computation (this module's `free_slots`),
//! the constraint applicator (`apply_work_hours`, `apply_blackouts`), and
//! the placer (`schedule_ordered`), which is the only stateful piece.

use crate::error::TaError;
use crate::types::BusyInterval;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Timelike};
use chrono_tz::Tz;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl Interval {
    fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    fn is_positive(&self) -> bool {
        self.start < self.end
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WeeklyBlackout {
    pub weekday: chrono::Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Copy)]
pub struct DateBlackout {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    pub work_start_hour: u32,
    pub work_end_hour: u32,
    pub min_gap_minutes: i64,
    pub max_tasks_per_day: Option<usize>,
    pub weekly_blackouts: Vec<WeeklyBlackout>,
    pub date_blackouts: Vec<DateBlackout>,
}

#[derive(Debug, Clone, Copy)]
pub struct Assignment {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

/// Step 4.7.1: turn busy events into free intervals within `[window.start,
/// window.end]`. Holiday-calendar filtering has already happened upstream,
/// by the time events reach this function everything in `busy` counts.
pub fn free_slots(busy: &[BusyInterval], window: Interval) -> Vec<Interval> {
    let mut sorted: Vec<&BusyInterval> = busy.iter().collect();
    sorted.sort_by_key(|b| b.start);

    let mut free = Vec::new();
    let mut cursor = window.start;

    for b in sorted {
        let bs = b.start.max(window.start);
        let be = b.end.min(window.end);
        if bs > cursor {
            let candidate = Interval { start: cursor, end: bs.min(window.end) };
            if candidate.is_positive() {
                free.push(candidate);
            }
        }
        if be > cursor {
            cursor = be;
        }
    }

    if cursor < window.end {
        free.push(Interval { start: cursor, end: window.end });
    }

    free
}

fn next_local_midnight(dt: DateTime<Tz>) -> DateTime<Tz> {
    let next_date = dt.date_naive().succ_opt().unwrap_or(dt.date_naive());
    dt.timezone()
        .with_ymd_and_hms(next_date.year(), next_date.month(), next_date.day(), 0, 0, 0)
        .single()
        .unwrap_or(dt)
}

/// Split an interval at every local midnight it crosses so later steps can
/// reason about "this day's" availability without an interval spanning two
/// calendar dates.
fn split_by_midnight(interval: Interval) -> Vec<Interval> {
    let mut pieces = Vec::new();
    let mut cursor = interval.start;

    while cursor < interval.end {
        let boundary = next_local_midnight(cursor).min(interval.end);
        if boundary > cursor {
            pieces.push(Interval { start: cursor, end: boundary });
        }
        cursor = boundary;
    }

    pieces
}

fn at_hour(dt: DateTime<Tz>, hour: u32) -> DateTime<Tz> {
    dt.timezone()
        .with_ymd_and_hms(dt.year(), dt.month(), dt.day(), hour.min(23), 0, 0)
        .single()
        .unwrap_or(dt)
}

fn intersect(a: Interval, b: Interval) -> Option<Interval> {
    let start = a.start.max(b.start);
    let end = a.end.min(b.end);
    (start < end).then_some(Interval { start, end })
}

/// Intersect each (already midnight-split) interval with the per-day
/// work-hour window.
pub fn apply_work_hours(intervals: &[Interval], opts: &ScheduleOptions) -> Vec<Interval> {
    intervals
        .iter()
        .flat_map(|iv| split_by_midnight(*iv))
        .filter_map(|piece| {
            let day_window = Interval {
                start: at_hour(piece.start, opts.work_start_hour),
                end: at_hour(piece.start, opts.work_end_hour),
            };
            intersect(piece, day_window)
        })
        .collect()
}

fn subtract_block(intervals: &[Interval], block: Interval) -> Vec<Interval> {
    let mut result = Vec::new();
    for iv in intervals {
        if block.end <= iv.start || block.start >= iv.end {
            result.push(*iv);
            continue;
        }
        if block.start > iv.start {
            result.push(Interval { start: iv.start, end: block.start });
        }
        if block.end < iv.end {
            result.push(Interval { start: block.end, end: iv.end });
        }
    }
    result
}

/// Subtract recurring and date-specific blackout windows from availability.
pub fn apply_blackouts(intervals: &[Interval], opts: &ScheduleOptions) -> Vec<Interval> {
    let mut current = intervals.to_vec();

    for iv in intervals {
        let date = iv.start.date_naive();
        for wb in &opts.weekly_blackouts {
            if iv.start.weekday() == wb.weekday {
                if let Some(block) = time_range_on(date, wb.start_time, wb.end_time, iv.start.timezone()) {
                    current = subtract_block(&current, block);
                }
            }
        }
        for db in &opts.date_blackouts {
            if date == db.date {
                if let Some(block) = time_range_on(date, db.start_time, db.end_time, iv.start.timezone()) {
                    current = subtract_block(&current, block);
                }
            }
        }
    }

    current.retain(Interval::is_positive);
    current
}

fn time_range_on(date: NaiveDate, start: NaiveTime, end: NaiveTime, tz: Tz) -> Option<Interval> {
    let s = tz
        .with_ymd_and_hms(date.year(), date.month(), date.day(), start.hour(), start.minute(), start.second())
        .single()?;
    let e = tz
        .with_ymd_and_hms(date.year(), date.month(), date.day(), end.hour(), end.minute(), end.second())
        .single()?;
    (s < e).then_some(Interval { start: s, end: e })
}

fn eligible_days(intervals: &[Interval]) -> Vec<NaiveDate> {
    let mut days: Vec<NaiveDate> = intervals.iter().map(|iv| iv.start.date_naive()).collect();
    days.sort();
    days.dedup();
    days
}

/// `t_i = round(i*(k-1)/(n-1))`; a single task targets the middle day.
fn target_day_index(i: usize, n: usize, k: usize) -> usize {
    if n <= 1 || k <= 1 {
        return (k.saturating_sub(1)) / 2;
    }
    let t = (i as f64) * ((k - 1) as f64) / ((n - 1) as f64);
    t.round() as usize
}

/// Earliest block on `day` that can still fit `required_minutes` starting at
/// or after `cursor` — not necessarily the day's globally-earliest block,
/// since an earlier block may be too small only because `cursor` has eaten
/// into it (or it's stale from a previous task's placement).
fn earliest_block_on_day(intervals: &[Interval], day: NaiveDate, required_minutes: i64, cursor: DateTime<Tz>) -> Option<Interval> {
    intervals
        .iter()
        .filter(|iv| iv.start.date_naive() == day)
        .filter_map(|iv| {
            let usable_start = iv.start.max(cursor);
            if (iv.end - usable_start).num_minutes() < required_minutes {
                return None;
            }
            Some(Interval { start: usable_start, end: usable_start + chrono::Duration::minutes(required_minutes) })
        })
        .min_by_key(|iv| iv.start)
}

/// The stateful placer: 4.7.2-4.7.5. `durations` is a fixed-order list of
/// required minutes (length 1 for a simple task, n for a complex task's
/// subtasks). Returns one assignment per duration, in order, or a hard
/// error — placement is all-or-nothing.
pub fn schedule_ordered(
    durations: &[i64],
    window: Interval,
    busy: &[BusyInterval],
    opts: &ScheduleOptions,
) -> Result<Vec<Assignment>, TaError> {
    let raw_free = free_slots(busy, window);
    if raw_free.iter().all(|iv| !iv.is_positive()) {
        return Err(TaError::NoFreeSlots);
    }

    let windowed = apply_work_hours(&raw_free, opts);
    let mut available = apply_blackouts(&windowed, opts);

    let total_available: i64 = available.iter().map(Interval::minutes).sum();
    let total_required: i64 = durations.iter().sum();
    if total_required > total_available {
        return Err(TaError::Infeasible { required: total_required, available: total_available });
    }

    let days = eligible_days(&available);
    let k = days.len().max(1);
    let n = durations.len();

    let mut per_day_count: HashMap<NaiveDate, usize> = HashMap::new();
    let mut assignments = Vec::with_capacity(n);
    let mut cursor = window.start;

    for (i, &required) in durations.iter().enumerate() {
        let target_idx = target_day_index(i, n, k);

        let candidate_days: Vec<NaiveDate> = days
            .iter()
            .copied()
            .filter(|d| {
                let under_cap = opts.max_tasks_per_day.is_none_or(|cap| per_day_count.get(d).copied().unwrap_or(0) < cap);
                under_cap && earliest_block_on_day(&available, *d, required, cursor).is_some()
            })
            .collect();

        let best_day = candidate_days
            .into_iter()
            .enumerate()
            .min_by_key(|(idx_in_list, d)| {
                let day_index = days.iter().position(|x| x == d).unwrap_or(*idx_in_list);
                let distance = (day_index as i64 - target_idx as i64).abs();
                let load = per_day_count.get(d).copied().unwrap_or(0);
                (distance, load)
            })
            .map(|(_, d)| d);

        let Some(day) = best_day else {
            return Err(TaError::CannotPlace(i));
        };

        let block = earliest_block_on_day(&available, day, required, cursor).ok_or(TaError::CannotPlace(i))?;

        let gap_end = block.end + chrono::Duration::minutes(opts.min_gap_minutes);
        available = subtract_block(&available, Interval { start: block.start, end: gap_end });
        cursor = block.end + chrono::Duration::minutes(opts.min_gap_minutes);
        *per_day_count.entry(day).or_insert(0) += 1;

        assignments.push(Assignment { start: block.start, end: block.end });
    }

    validate_assignments(&assignments, durations, window, busy)?;
    Ok(assignments)
}

fn validate_assignments(
    assignments: &[Assignment],
    durations: &[i64],
    window: Interval,
    busy: &[BusyInterval],
) -> Result<(), TaError> {
    for (i, a) in assignments.iter().enumerate() {
        if !(window.start <= a.start && a.start < a.end && a.end <= window.end) {
            return Err(TaError::InvariantViolated(format!("slot {i} outside window")));
        }
        if (a.end - a.start).num_minutes() != durations[i] {
            return Err(TaError::InvariantViolated(format!("slot {i} has wrong duration")));
        }
        for b in busy {
            if a.start < b.end && b.start < a.end {
                return Err(TaError::InvariantViolated(format!("slot {i} overlaps a busy event")));
            }
        }
        if i > 0 && a.start < assignments[i - 1].end {
            return Err(TaError::InvariantViolated(format!("slot {i} violates precedence")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ny() -> Tz {
        chrono_tz::America::New_York
    }

    fn dt(y: i32, m: u32, d: u32, h: u32, mi: u32) -> DateTime<Tz> {
        ny().with_ymd_and_hms(y, m, d, h, mi, 0).unwrap()
    }

    fn default_opts() -> ScheduleOptions {
        ScheduleOptions {
            work_start_hour: 6,
            work_end_hour: 23,
            min_gap_minutes: 0,
            max_tasks_per_day: None,
            weekly_blackouts: Vec::new(),
            date_blackouts: Vec::new(),
        }
    }

    #[test]
    fn free_slots_subtracts_busy_intervals() {
        let window = Interval { start: dt(2025, 10, 22, 6, 0), end: dt(2025, 10, 22, 23, 0) };
        let busy = [BusyInterval { start: dt(2025, 10, 22, 10, 0), end: dt(2025, 10, 22, 11, 0) }];
        let free = free_slots(&busy, window);
        assert_eq!(free.len(), 2);
        assert_eq!(free[0].end, dt(2025, 10, 22, 10, 0));
        assert_eq!(free[1].start, dt(2025, 10, 22, 11, 0));
    }

    #[test]
    fn simple_task_places_in_only_free_gap() {
        let window = Interval { start: dt(2025, 10, 22, 14, 0), end: dt(2025, 10, 22, 14, 30) };
        let assignments = schedule_ordered(&[30], window, &[], &default_opts()).unwrap();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].start, dt(2025, 10, 22, 14, 0));
        assert_eq!(assignments[0].end, dt(2025, 10, 22, 14, 30));
    }

    #[test]
    fn exact_fit_is_schedulable_one_minute_more_is_infeasible() {
        let window = Interval { start: dt(2025, 10, 22, 14, 0), end: dt(2025, 10, 22, 14, 30) };
        assert!(schedule_ordered(&[30], window, &[], &default_opts()).is_ok());
        assert!(matches!(
            schedule_ordered(&[31], window, &[], &default_opts()),
            Err(TaError::Infeasible { .. })
        ));
    }

    #[test]
    fn fully_busy_window_yields_no_free_slots() {
        let window = Interval { start: dt(2025, 10, 22, 9, 0), end: dt(2025, 10, 22, 10, 0) };
        let busy = [BusyInterval { start: dt(2025, 10, 22, 9, 0), end: dt(2025, 10, 22, 10, 0) }];
        assert!(matches!(schedule_ordered(&[15], window, &busy, &default_opts()), Err(TaError::NoFreeSlots)));
    }

    #[test]
    fn complex_subtasks_respect_precedence() {
        let window = Interval { start: dt(2025, 10, 22, 6, 0), end: dt(2025, 10, 25, 23, 0) };
        let assignments = schedule_ordered(&[60, 60, 60], window, &[], &default_opts()).unwrap();
        for pair in assignments.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn weekly_blackout_is_subtracted() {
        let window = Interval { start: dt(2025, 10, 22, 6, 0), end: dt(2025, 10, 22, 23, 0) };
        let mut opts = default_opts();
        opts.weekly_blackouts.push(WeeklyBlackout {
            weekday: dt(2025, 10, 22, 0, 0).weekday(),
            start_time: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
        });
        let result = schedule_ordered(&[30], window, &[], &opts).unwrap();
        assert!(result[0].start >= dt(2025, 10, 22, 22, 0));
    }

    #[test]
    fn later_chunk_on_same_day_is_still_usable_after_an_earlier_one_falls_stale() {
        // Free chunks on the one day: [6:00,6:30) 30m, [10:00,12:00) 120m,
        // [15:00,15:40) 40m. Task0 (100m) takes the middle chunk, leaving
        // [11:40,12:00) (20m) and advancing the cursor to 11:40. Task1 (20m)
        // must land in that 20m remainder (or the 40m evening chunk), not
        // be rejected just because the day's globally-earliest chunk
        // ([6:00,6:30)) is now before the cursor.
        let window = Interval { start: dt(2025, 10, 22, 6, 0), end: dt(2025, 10, 22, 16, 0) };
        let busy = [
            BusyInterval { start: dt(2025, 10, 22, 6, 30), end: dt(2025, 10, 22, 10, 0) },
            BusyInterval { start: dt(2025, 10, 22, 12, 0), end: dt(2025, 10, 22, 15, 0) },
            BusyInterval { start: dt(2025, 10, 22, 15, 40), end: dt(2025, 10, 22, 16, 0) },
        ];

        let assignments = schedule_ordered(&[100, 20], window, &busy, &default_opts()).unwrap();
        assert_eq!(assignments[0].start, dt(2025, 10, 22, 10, 0));
        assert_eq!(assignments[0].end, dt(2025, 10, 22, 11, 40));
        assert_eq!(assignments[1].start, dt(2025, 10, 22, 11, 40));
        assert_eq!(assignments[1].end, dt(2025, 10, 22, 12, 0));
    }
}
