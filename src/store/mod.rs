//! SQLite-backed task/event-map persistence. Schema mirrors the teacher's
//! plain-`sqlx::query` style (runtime-checked, not the `query!` macro) so
//! the crate doesn't need a live database at compile time.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

pub async fn connect(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    let url = format!("sqlite://{db_path}?mode=rwc");
    let pool = SqlitePool::connect(&url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

pub struct TaskRow {
    pub id: Uuid,
    pub title: String,
    pub parent_id: Option<Uuid>,
}

pub struct EventMapRow {
    pub task_id: Uuid,
    pub calendar_id: String,
    pub calendar_event_id: String,
}

/// Insert a task row and, if an external event was created for it, its
/// event_map row, in a single transaction. Parent rows for complex tasks
/// pass `event: None`.
pub async fn upsert_task_with_event(
    pool: &SqlitePool,
    task: &TaskRow,
    event: Option<&EventMapRow>,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("INSERT OR REPLACE INTO tasks (id, title, parent_id) VALUES (?, ?, ?)")
        .bind(task.id.to_string())
        .bind(&task.title)
        .bind(task.parent_id.map(|id| id.to_string()))
        .execute(&mut *tx)
        .await?;

    if let Some(e) = event {
        sqlx::query(
            "INSERT OR REPLACE INTO event_map (task_id, calendar_id, calendar_event_id) VALUES (?, ?, ?)",
        )
        .bind(e.task_id.to_string())
        .bind(&e.calendar_id)
        .bind(&e.calendar_event_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn children_of(pool: &SqlitePool, parent_id: Uuid) -> Result<Vec<TaskRow>, sqlx::Error> {
    let rows = sqlx::query("SELECT id, title, parent_id FROM tasks WHERE parent_id = ?")
        .bind(parent_id.to_string())
        .fetch_all(pool)
        .await?;

    rows.into_iter()
        .map(|r| row_to_task(&r))
        .collect::<Result<Vec<_>, _>>()
}

pub async fn find_task(pool: &SqlitePool, id: Uuid) -> Result<Option<TaskRow>, sqlx::Error> {
    let row = sqlx::query("SELECT id, title, parent_id FROM tasks WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_task).transpose()
}

pub async fn event_for_task(pool: &SqlitePool, task_id: Uuid) -> Result<Option<EventMapRow>, sqlx::Error> {
    let row = sqlx::query("SELECT task_id, calendar_id, calendar_event_id FROM event_map WHERE task_id = ?")
        .bind(task_id.to_string())
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| EventMapRow {
        task_id,
        calendar_id: r.get("calendar_id"),
        calendar_event_id: r.get("calendar_event_id"),
    }))
}

pub async fn delete_task_row(pool: &SqlitePool, id: Uuid) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM event_map WHERE task_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<TaskRow, sqlx::Error> {
    let id: String = row.get("id");
    let parent_id: Option<String> = row.get("parent_id");
    Ok(TaskRow {
        id: Uuid::parse_str(&id).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        title: row.get("title"),
        parent_id: parent_id
            .map(|p| Uuid::parse_str(&p).map_err(|e| sqlx::Error::Decode(Box::new(e))))
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn upsert_then_find_round_trips_a_task() {
        let pool = memory_pool().await;
        let id = Uuid::new_v4();
        let task = TaskRow { id, title: "Write report".into(), parent_id: None };
        upsert_task_with_event(&pool, &task, None).await.unwrap();

        let found = find_task(&pool, id).await.unwrap().unwrap();
        assert_eq!(found.title, "Write report");
        assert_eq!(found.parent_id, None);
    }

    #[tokio::test]
    async fn upsert_with_event_is_queryable_by_task_id() {
        let pool = memory_pool().await;
        let id = Uuid::new_v4();
        let task = TaskRow { id, title: "Call dentist".into(), parent_id: None };
        let event = EventMapRow { task_id: id, calendar_id: "cal-1".into(), calendar_event_id: "evt-1".into() };
        upsert_task_with_event(&pool, &task, Some(&event)).await.unwrap();

        let found = event_for_task(&pool, id).await.unwrap().unwrap();
        assert_eq!(found.calendar_event_id, "evt-1");
    }

    #[tokio::test]
    async fn children_of_returns_only_direct_children() {
        let pool = memory_pool().await;
        let parent = Uuid::new_v4();
        upsert_task_with_event(&pool, &TaskRow { id: parent, title: "Plan trip".into(), parent_id: None }, None).await.unwrap();

        let child_a = Uuid::new_v4();
        let child_b = Uuid::new_v4();
        upsert_task_with_event(&pool, &TaskRow { id: child_a, title: "Book flight".into(), parent_id: Some(parent) }, None).await.unwrap();
        upsert_task_with_event(&pool, &TaskRow { id: child_b, title: "Book hotel".into(), parent_id: Some(parent) }, None).await.unwrap();

        let unrelated = Uuid::new_v4();
        upsert_task_with_event(&pool, &TaskRow { id: unrelated, title: "Unrelated".into(), parent_id: None }, None).await.unwrap();

        let children = children_of(&pool, parent).await.unwrap();
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.parent_id == Some(parent)));
    }

    #[tokio::test]
    async fn delete_task_row_removes_task_and_its_event_map_row() {
        let pool = memory_pool().await;
        let id = Uuid::new_v4();
        let task = TaskRow { id, title: "Buy groceries".into(), parent_id: None };
        let event = EventMapRow { task_id: id, calendar_id: "cal-1".into(), calendar_event_id: "evt-1".into() };
        upsert_task_with_event(&pool, &task, Some(&event)).await.unwrap();

        delete_task_row(&pool, id).await.unwrap();

        assert!(find_task(&pool, id).await.unwrap().is_none());
        assert!(event_for_task(&pool, id).await.unwrap().is_none());
    }
}
