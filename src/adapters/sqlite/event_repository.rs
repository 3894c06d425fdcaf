//! SQLite implementation of `EventQueue` — spec.md §4.7.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Event, EventFilter, EventStatus, EventType};
use crate::domain::ports::EventQueue;

#[derive(Clone)]
pub struct SqliteEventRepository {
    pool: SqlitePool,
}

impl SqliteEventRepository {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventQueue for SqliteEventRepository {
    async fn enqueue(&self, event_type: EventType, agent: &str, payload: serde_json::Value) -> DomainResult<Event> {
        let event = Event::new(event_type, agent, payload);
        sqlx::query(
            "INSERT INTO events (id, event_type, agent, payload, status, created_at, updated_at,
             last_error, retry_count) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.id.to_string())
        .bind(event.event_type.as_str())
        .bind(&event.agent)
        .bind(event.payload.to_string())
        .bind(event.status.as_str())
        .bind(event.created_at.to_rfc3339())
        .bind(event.updated_at.to_rfc3339())
        .bind(&event.last_error)
        .bind(i64::from(event.retry_count))
        .execute(&self.pool)
        .await?;
        Ok(event)
    }

    async fn list_events(&self, filter: &EventFilter) -> DomainResult<Vec<Event>> {
        let mut sql = String::from("SELECT * FROM events WHERE 1=1");
        if filter.event_type.is_some() {
            sql.push_str(" AND event_type = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY created_at DESC");
        if filter.limit > 0 {
            sql.push_str(" LIMIT ?");
        }

        let mut q = sqlx::query_as::<_, EventRow>(&sql);
        if let Some(t) = &filter.event_type {
            q = q.bind(t.as_str().to_string());
        }
        if let Some(s) = filter.status {
            q = q.bind(s.as_str());
        }
        if filter.limit > 0 {
            q = q.bind(filter.limit);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get_pending(&self, limit: i64) -> DomainResult<Vec<Event>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT * FROM events WHERE status = 'pending' ORDER BY created_at ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn claim(&self, id: Uuid) -> DomainResult<Option<Event>> {
        let now = Utc::now().to_rfc3339();
        // The WHERE clause makes this an atomic compare-and-swap: of N
        // concurrent callers racing the same id, only the first UPDATE sees
        // status='pending' and flips a row; the rest affect zero rows.
        let result = sqlx::query(
            "UPDATE events SET status = 'processing', updated_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(&now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(self.get_event(id).await?))
    }

    async fn update_status(&self, id: Uuid, status: EventStatus, error: Option<String>) -> DomainResult<()> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE events SET status = ?, last_error = ?, updated_at = ?,
             retry_count = CASE WHEN ? = 'failed' THEN retry_count + 1 ELSE retry_count END
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(&error)
        .bind(&now)
        .bind(status.as_str())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("event '{id}'")));
        }
        Ok(())
    }

    async fn get_event(&self, id: Uuid) -> DomainResult<Event> {
        let row: Option<EventRow> = sqlx::query_as("SELECT * FROM events WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or_else(|| DomainError::NotFound(format!("event '{id}'")))?
            .try_into()
    }

    async fn recover_stuck(&self, now: DateTime<Utc>, recovery_timeout: std::time::Duration) -> DomainResult<u64> {
        let cutoff = now - chrono::Duration::from_std(recovery_timeout)
            .map_err(|e| DomainError::Validation(e.to_string()))?;
        let result = sqlx::query(
            "UPDATE events SET status = 'pending', updated_at = ? WHERE status = 'processing' AND updated_at < ?",
        )
        .bind(now.to_rfc3339())
        .bind(cutoff.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    event_type: String,
    agent: String,
    payload: String,
    status: String,
    created_at: String,
    updated_at: String,
    last_error: Option<String>,
    retry_count: i64,
}

impl TryFrom<EventRow> for Event {
    type Error = DomainError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            id: super::parse_uuid(&row.id)?,
            event_type: EventType::parse_str(&row.event_type),
            agent: row.agent,
            payload: serde_json::from_str(&row.payload)?,
            status: EventStatus::parse_str(&row.status)
                .ok_or_else(|| DomainError::Fatal(format!("invalid event status '{}'", row.status)))?,
            created_at: super::parse_datetime(&row.created_at)?,
            updated_at: super::parse_datetime(&row.updated_at)?,
            last_error: row.last_error,
            retry_count: u32::try_from(row.retry_count).unwrap_or(0),
        })
    }
}
