use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entry point to the pipeline: a single natural-language utterance plus the
/// zone it should be interpreted in. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserQuery {
    pub query: String,
    pub timezone: chrono_tz::Tz,
}

impl UserQuery {
    pub fn new(query: impl Into<String>, timezone: chrono_tz::Tz) -> Self {
        Self {
            query: query.into().trim().to_string(),
            timezone,
        }
    }
}

/// Raw, verbatim phrases pulled out of the query by SE. `None` means "not stated".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Slots {
    pub start_text: Option<String>,
    pub end_text: Option<String>,
    pub duration: Option<String>,
}

/// Canonical-but-still-stringly-typed absolute datetimes produced by AR.
/// Canonical form is `"Month DD, YYYY HH:MM am/pm"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub start_text: String,
    pub end_text: String,
    pub duration: Option<String>,
}

/// Timezone-aware, normalized output of TS. `start <= end` is an invariant
/// of every value of this type that leaves the module.
#[derive(Debug, Clone, Serialize)]
pub struct Standardized {
    pub start: chrono::DateTime<chrono_tz::Tz>,
    pub end: chrono::DateTime<chrono_tz::Tz>,
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Simple,
    Complex,
}

/// TD's output: a classified, titled, calendar-assigned task, still
/// unscheduled. `duration` is ISO-8601 (`PT...`) or absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub calendar: Option<String>,
    pub kind: TaskKind,
    pub title: String,
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub title: String,
    /// ISO-8601 duration, `PT...`, capped to 3 hours.
    pub duration: String,
}

/// LD's output: a complex task broken into 2-5 ordered subtasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decomposition {
    pub calendar: Option<String>,
    pub title: String,
    pub subtasks: Vec<Subtask>,
}

/// A concrete, timezone-aware interval a task has been placed into.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Slot {
    pub start: chrono::DateTime<chrono_tz::Tz>,
    pub end: chrono::DateTime<chrono_tz::Tz>,
}

impl Slot {
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledSimple {
    pub id: Uuid,
    pub calendar: String,
    pub title: String,
    pub slot: Slot,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledSubtask {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub title: String,
    pub slot: Slot,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledComplex {
    pub id: Uuid,
    pub calendar: String,
    pub title: String,
    pub parent_id: Option<Uuid>,
    pub subtasks: Vec<ScheduledSubtask>,
}

/// The artifact TA hands to EC: either a single scheduled event or a
/// scheduled parent plus its ordered subtask events.
#[derive(Debug, Clone, Serialize)]
pub enum Scheduled {
    Simple(ScheduledSimple),
    Complex(ScheduledComplex),
}

/// A busy interval fetched from the calendar bridge, already filtered for
/// holiday calendars by the caller.
#[derive(Debug, Clone, Copy)]
pub struct BusyInterval {
    pub start: chrono::DateTime<chrono_tz::Tz>,
    pub end: chrono::DateTime<chrono_tz::Tz>,
}

#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    pub deleted: Vec<DeletedEvent>,
    pub skipped: Vec<SkippedEvent>,
    pub errors: Vec<FailedEvent>,
}

#[derive(Debug, Clone)]
pub struct DeletedEvent {
    pub task_id: Uuid,
    pub calendar_event_id: String,
}

#[derive(Debug, Clone)]
pub struct SkippedEvent {
    pub task_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct FailedEvent {
    pub task_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub created: Vec<DeletedEvent>,
    pub failed: Vec<FailedEvent>,
}
