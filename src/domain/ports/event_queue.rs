//! Event queue port — spec.md §4.7.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Event, EventFilter, EventType};

#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Writes `status=pending`, `created_at=now`.
    async fn enqueue(&self, event_type: EventType, agent: &str, payload: serde_json::Value) -> DomainResult<Event>;

    /// Paginated listing, newest first.
    async fn list_events(&self, filter: &EventFilter) -> DomainResult<Vec<Event>>;

    /// `status=pending`, ordered oldest first.
    async fn get_pending(&self, limit: i64) -> DomainResult<Vec<Event>>;

    /// Atomically transitions `pending -> processing` in a row-locked
    /// update and returns the claimed row, or `None` if it was already
    /// claimed by a concurrent caller. Exactly one of N concurrent callers
    /// racing the same event id wins.
    async fn claim(&self, id: Uuid) -> DomainResult<Option<Event>>;

    /// Atomic status transition; sets `updated_at`. Passing
    /// `status=Pending` with `error=None` clears `last_error` (the operator
    /// retry path).
    async fn update_status(&self, id: Uuid, status: crate::domain::models::EventStatus, error: Option<String>) -> DomainResult<()>;

    async fn get_event(&self, id: Uuid) -> DomainResult<Event>;

    /// Startup recovery sweep: re-pend rows stuck in `processing` with
    /// `updated_at` older than `recovery_timeout` before `now`, returning
    /// how many were recovered.
    async fn recover_stuck(&self, now: DateTime<Utc>, recovery_timeout: std::time::Duration) -> DomainResult<u64>;
}
