//! Event Creator: pre-flight validation, retrying external writes, and
//! transactional local persistence. Retries live exclusively here, per the
//! retry-boundary design note — no other stage retries upstream.

use crate::bridge::{BridgeError, CalendarBridgeClient};
use crate::error::EcError;
use crate::store::{self, EventMapRow, TaskRow};
use crate::types::{CreateOutcome, DeleteOutcome, DeletedEvent, FailedEvent, Scheduled, SkippedEvent};
use sqlx::SqlitePool;
use std::time::Duration;
use uuid::Uuid;

const BACKOFFS_MS: [u64; 3] = [100, 500, 2000];

pub struct EventCreator<'a> {
    bridge: &'a CalendarBridgeClient,
    pool: &'a SqlitePool,
}

impl<'a> EventCreator<'a> {
    pub fn new(bridge: &'a CalendarBridgeClient, pool: &'a SqlitePool) -> Self {
        Self { bridge, pool }
    }

    pub async fn create(&self, scheduled: &Scheduled) -> Result<CreateOutcome, EcError> {
        match scheduled {
            Scheduled::Simple(s) => self.create_simple(s).await,
            Scheduled::Complex(c) => self.create_complex(c).await,
        }
    }

    async fn create_simple(&self, s: &crate::types::ScheduledSimple) -> Result<CreateOutcome, EcError> {
        if s.calendar.is_empty() || s.title.is_empty() || s.slot.start >= s.slot.end {
            return Err(EcError::InputInvalid("simple task failed pre-flight validation".into()));
        }

        let notes = format!("id:{}, parent_id:null", s.id);
        match self.write_with_retry(&s.title, s.slot.start.to_rfc3339(), s.slot.end.to_rfc3339(), &notes, &s.calendar).await {
            Ok(calendar_event_id) => {
                let task = TaskRow { id: s.id, title: s.title.clone(), parent_id: None };
                let event = EventMapRow { task_id: s.id, calendar_id: s.calendar.clone(), calendar_event_id: calendar_event_id.clone() };
                store::upsert_task_with_event(self.pool, &task, Some(&event)).await?;
                Ok(CreateOutcome {
                    created: vec![DeletedEvent { task_id: s.id, calendar_event_id }],
                    failed: Vec::new(),
                })
            }
            Err(e) => Ok(CreateOutcome { created: Vec::new(), failed: vec![FailedEvent { task_id: s.id, reason: e.to_string() }] }),
        }
    }

    async fn create_complex(&self, c: &crate::types::ScheduledComplex) -> Result<CreateOutcome, EcError> {
        if c.subtasks.is_empty() || c.subtasks.len() > 5 {
            return Err(EcError::InputInvalid("complex task must have 1-5 subtasks".into()));
        }
        for st in &c.subtasks {
            if st.parent_id != c.id || st.title.is_empty() || st.slot.start >= st.slot.end {
                return Err(EcError::InputInvalid("subtask failed pre-flight validation".into()));
            }
        }

        // Parent row is always persisted, even though it has no external event.
        let parent_row = TaskRow { id: c.id, title: c.title.clone(), parent_id: None };
        store::upsert_task_with_event(self.pool, &parent_row, None).await?;

        let mut created = Vec::new();
        let mut failed = Vec::new();

        for st in &c.subtasks {
            let notes = format!("id:{}, parent_id:{}", st.id, c.id);
            match self.write_with_retry(&st.title, st.slot.start.to_rfc3339(), st.slot.end.to_rfc3339(), &notes, &c.calendar).await {
                Ok(calendar_event_id) => {
                    let task = TaskRow { id: st.id, title: st.title.clone(), parent_id: Some(c.id) };
                    let event = EventMapRow { task_id: st.id, calendar_id: c.calendar.clone(), calendar_event_id: calendar_event_id.clone() };
                    store::upsert_task_with_event(self.pool, &task, Some(&event)).await?;
                    created.push(DeletedEvent { task_id: st.id, calendar_event_id });
                }
                Err(e) => failed.push(FailedEvent { task_id: st.id, reason: e.to_string() }),
            }
        }

        Ok(CreateOutcome { created, failed })
    }

    async fn write_with_retry(&self, title: &str, start_iso: String, end_iso: String, notes: &str, calendar: &str) -> Result<String, EcError> {
        let mut attempt = 0;
        loop {
            match self.bridge.add_event(title, start_iso.clone(), end_iso.clone(), Some(notes), Some(calendar)).await {
                Ok(event) => return Ok(event.id),
                Err(BridgeError::Permanent(status)) => {
                    return Err(EcError::BridgePermanent { status, body: String::new() });
                }
                Err(e) if e.is_retryable() && attempt < BACKOFFS_MS.len() - 1 => {
                    tracing::warn!(attempt, title, error = %e, "add_event failed, retrying");
                    tokio::time::sleep(Duration::from_millis(BACKOFFS_MS[attempt])).await;
                    attempt += 1;
                }
                Err(e) => return Err(EcError::BridgeFailure(e.to_string())),
            }
        }
    }

    /// Delete a task by id. If it is a parent, cascades to its children.
    pub async fn delete_by_id(&self, id: Uuid) -> Result<DeleteOutcome, EcError> {
        let children = store::children_of(self.pool, id).await?;
        if !children.is_empty() {
            return self.delete_family(id, &children).await;
        }

        let mut outcome = DeleteOutcome { deleted: Vec::new(), skipped: Vec::new(), errors: Vec::new() };
        self.delete_leaf(id, &mut outcome).await?;
        Ok(outcome)
    }

    pub async fn delete_by_parent_id(&self, parent_id: Uuid) -> Result<DeleteOutcome, EcError> {
        let children = store::children_of(self.pool, parent_id).await?;
        self.delete_family(parent_id, &children).await
    }

    async fn delete_family(&self, parent_id: Uuid, children: &[TaskRow]) -> Result<DeleteOutcome, EcError> {
        let mut outcome = DeleteOutcome { deleted: Vec::new(), skipped: Vec::new(), errors: Vec::new() };
        for child in children {
            self.delete_leaf(child.id, &mut outcome).await?;
        }
        store::delete_task_row(self.pool, parent_id).await?;
        Ok(outcome)
    }

    async fn delete_leaf(&self, id: Uuid, outcome: &mut DeleteOutcome) -> Result<(), EcError> {
        let Some(event) = store::event_for_task(self.pool, id).await? else {
            outcome.skipped.push(SkippedEvent { task_id: id, reason: "not_found".into() });
            store::delete_task_row(self.pool, id).await?;
            return Ok(());
        };

        match self.delete_with_retry(&event.calendar_event_id).await {
            Ok(true) => {
                outcome.deleted.push(DeletedEvent { task_id: id, calendar_event_id: event.calendar_event_id });
            }
            Ok(false) => {
                outcome.skipped.push(SkippedEvent { task_id: id, reason: "already_deleted".into() });
            }
            Err(e) => {
                outcome.errors.push(FailedEvent { task_id: id, reason: e.to_string() });
                return Ok(());
            }
        }

        store::delete_task_row(self.pool, id).await?;
        Ok(())
    }

    async fn delete_with_retry(&self, calendar_event_id: &str) -> Result<bool, EcError> {
        let mut attempt = 0;
        loop {
            match self.bridge.delete_event(calendar_event_id).await {
                Ok(confirmed) => return Ok(confirmed),
                Err(BridgeError::Permanent(status)) => {
                    return Err(EcError::BridgePermanent { status, body: String::new() });
                }
                Err(e) if e.is_retryable() && attempt < BACKOFFS_MS.len() - 1 => {
                    tracing::warn!(attempt, calendar_event_id, error = %e, "delete_event failed, retrying");
                    tokio::time::sleep(Duration::from_millis(BACKOFFS_MS[attempt])).await;
                    attempt += 1;
                }
                Err(e) => return Err(EcError::BridgeFailure(e.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::CalendarBridgeClient;
    use crate::types::Slot;
    use chrono::TimeZone;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn ny_slot() -> Slot {
        let tz = chrono_tz::America::New_York;
        Slot {
            start: tz.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
            end: tz.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn create_simple_persists_task_and_event_map_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/add"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "evt-1", "title": "Write report", "start_iso": "2026-03-02T09:00:00-05:00",
                "end_iso": "2026-03-02T10:00:00-05:00", "calendar": "cal-work",
            })))
            .mount(&server)
            .await;

        let bridge = CalendarBridgeClient::new(server.uri(), Duration::from_secs(5), Duration::from_secs(5));
        let pool = memory_pool().await;
        let ec = EventCreator::new(&bridge, &pool);

        let id = Uuid::new_v4();
        let scheduled = Scheduled::Simple(crate::types::ScheduledSimple {
            id,
            calendar: "cal-work".into(),
            title: "Write report".into(),
            slot: ny_slot(),
            parent_id: None,
        });

        let outcome = ec.create(&scheduled).await.unwrap();
        assert_eq!(outcome.created.len(), 1);
        assert!(outcome.failed.is_empty());

        let row = store::find_task(&pool, id).await.unwrap().unwrap();
        assert_eq!(row.title, "Write report");
        let event = store::event_for_task(&pool, id).await.unwrap().unwrap();
        assert_eq!(event.calendar_event_id, "evt-1");
    }

    #[tokio::test]
    async fn create_simple_reports_permanent_bridge_error_as_failed_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/add"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let bridge = CalendarBridgeClient::new(server.uri(), Duration::from_secs(5), Duration::from_secs(5));
        let pool = memory_pool().await;
        let ec = EventCreator::new(&bridge, &pool);

        let id = Uuid::new_v4();
        let scheduled = Scheduled::Simple(crate::types::ScheduledSimple {
            id,
            calendar: "cal-work".into(),
            title: "Write report".into(),
            slot: ny_slot(),
            parent_id: None,
        });

        let outcome = ec.create(&scheduled).await.unwrap();
        assert!(outcome.created.is_empty());
        assert_eq!(outcome.failed.len(), 1);
        assert!(store::find_task(&pool, id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_by_parent_id_cascades_to_children_and_skips_missing_events() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/delete"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"deleted": true})))
            .mount(&server)
            .await;

        let bridge = CalendarBridgeClient::new(server.uri(), Duration::from_secs(5), Duration::from_secs(5));
        let pool = memory_pool().await;

        let parent_id = Uuid::new_v4();
        store::upsert_task_with_event(&pool, &TaskRow { id: parent_id, title: "Plan offsite".into(), parent_id: None }, None)
            .await
            .unwrap();

        let child_with_event = Uuid::new_v4();
        store::upsert_task_with_event(
            &pool,
            &TaskRow { id: child_with_event, title: "Book venue".into(), parent_id: Some(parent_id) },
            Some(&EventMapRow { task_id: child_with_event, calendar_id: "cal-work".into(), calendar_event_id: "evt-1".into() }),
        )
        .await
        .unwrap();

        let child_without_event = Uuid::new_v4();
        store::upsert_task_with_event(
            &pool,
            &TaskRow { id: child_without_event, title: "Research venues".into(), parent_id: Some(parent_id) },
            None,
        )
        .await
        .unwrap();

        let ec = EventCreator::new(&bridge, &pool);
        let outcome = ec.delete_by_parent_id(parent_id).await.unwrap();

        assert_eq!(outcome.deleted.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert!(outcome.errors.is_empty());
        assert!(store::find_task(&pool, parent_id).await.unwrap().is_none());
        assert!(store::find_task(&pool, child_with_event).await.unwrap().is_none());
    }
}
