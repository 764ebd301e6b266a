//! Time Allotment Agent: fetches busy events for the chosen calendar,
//! computes free slots, and places the task (or its subtasks) in order.
//! The heavy lifting lives in `crate::scheduler`; this module is the glue
//! that turns a Classification/Decomposition plus a Standardized window
//! into a `Scheduled` artifact.

use crate::bridge::CalendarBridgeClient;
use crate::config::Config;
use crate::error::TaError;
use crate::scheduler::{self, Interval, ScheduleOptions};
use crate::types::{
    BusyInterval, Classification, Decomposition, Scheduled, ScheduledComplex, ScheduledSimple,
    ScheduledSubtask, Slot, Standardized,
};
use chrono::DateTime;
use chrono_tz::Tz;
use uuid::Uuid;

pub struct TimeAllotmentAgent<'a> {
    bridge: &'a CalendarBridgeClient,
    config: &'a Config,
}

impl<'a> TimeAllotmentAgent<'a> {
    pub fn new(bridge: &'a CalendarBridgeClient, config: &'a Config) -> Self {
        Self { bridge, config }
    }

    pub async fn place_simple(&self, classification: &Classification, window: &Standardized) -> Result<Scheduled, TaError> {
        let calendar = classification.calendar.clone().ok_or(TaError::NoCalendar)?;
        let minutes = duration_minutes(classification.duration.as_deref())
            .unwrap_or(self.config.default_simple_duration_minutes);

        let busy = self.fetch_busy(&calendar, window).await?;
        let opts = self.options(self.config.min_gap_minutes_simple);
        let win = Interval { start: window.start, end: window.end };

        let assignments = scheduler::schedule_ordered(&[minutes], win, &busy, &opts)
            .inspect_err(|e| tracing::warn!(calendar = %calendar, error = %e, "simple task placement rejected"))?;
        let a = assignments[0];

        Ok(Scheduled::Simple(ScheduledSimple {
            id: Uuid::new_v4(),
            calendar,
            title: classification.title.clone(),
            slot: Slot { start: a.start, end: a.end },
            parent_id: None,
        }))
    }

    pub async fn place_complex(&self, decomposition: &Decomposition, window: &Standardized) -> Result<Scheduled, TaError> {
        let calendar = decomposition.calendar.clone().ok_or(TaError::NoCalendar)?;
        let durations: Vec<i64> = decomposition
            .subtasks
            .iter()
            .map(|s| duration_minutes(Some(&s.duration)).unwrap_or(60))
            .collect();

        let busy = self.fetch_busy(&calendar, window).await?;
        let opts = self.options(self.config.min_gap_minutes_complex);
        let win = Interval { start: window.start, end: window.end };

        let assignments = scheduler::schedule_ordered(&durations, win, &busy, &opts)
            .inspect_err(|e| tracing::warn!(calendar = %calendar, subtasks = durations.len(), error = %e, "complex task placement rejected"))?;

        let parent_id = Uuid::new_v4();
        let subtasks = decomposition
            .subtasks
            .iter()
            .zip(assignments)
            .map(|(st, a)| ScheduledSubtask {
                id: Uuid::new_v4(),
                parent_id,
                title: st.title.clone(),
                slot: Slot { start: a.start, end: a.end },
            })
            .collect();

        Ok(Scheduled::Complex(ScheduledComplex {
            id: parent_id,
            calendar,
            title: decomposition.title.clone(),
            parent_id: None,
            subtasks,
        }))
    }

    async fn fetch_busy(&self, calendar_id: &str, window: &Standardized) -> Result<Vec<BusyInterval>, TaError> {
        let days = window_days(window.start, window.end);
        let events = self
            .bridge
            .events(days, Some(calendar_id), true)
            .await
            .map_err(|e| TaError::InvariantViolated(format!("calendar fetch failed: {e}")))?;

        let tz = window.start.timezone();
        let busy = events
            .iter()
            .filter(|e| !e.calendar.to_lowercase().contains("holiday"))
            .filter_map(|e| {
                let start = DateTime::parse_from_rfc3339(&e.start_iso).ok()?.with_timezone(&tz);
                let end = DateTime::parse_from_rfc3339(&e.end_iso).ok()?.with_timezone(&tz);
                Some(BusyInterval { start, end })
            })
            .collect();

        Ok(busy)
    }

    fn options(&self, min_gap_minutes: i64) -> ScheduleOptions {
        ScheduleOptions {
            work_start_hour: self.config.work_start_hour,
            work_end_hour: self.config.work_end_hour,
            min_gap_minutes,
            max_tasks_per_day: self.config.max_tasks_per_day,
            weekly_blackouts: Vec::new(),
            date_blackouts: Vec::new(),
        }
    }
}

fn duration_minutes(iso: Option<&str>) -> Option<i64> {
    let iso = iso?.to_uppercase();
    let stripped = iso.strip_prefix("PT")?;
    let (hours, rest) = match stripped.split_once('H') {
        Some((h, rest)) => (h.parse::<i64>().ok()?, rest),
        None => (0, stripped),
    };
    let minutes = if let Some(m) = rest.strip_suffix('M') {
        m.parse::<i64>().ok()?
    } else if rest.is_empty() {
        0
    } else {
        return None;
    };
    Some(hours * 60 + minutes)
}

fn window_days(start: DateTime<Tz>, end: DateTime<Tz>) -> u32 {
    let days = ((end - start).num_days() + 1).max(1) as u32;
    days.min(365)
}
