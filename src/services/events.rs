//! Event queue service wrapper — spec.md §4.7. The port trait already
//! implements every operation; this adds the startup recovery sweep the
//! daemon's boot sequence runs before the hook dispatcher starts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::domain::errors::DomainResult;
use crate::domain::ports::EventQueue;

#[derive(Clone)]
pub struct EventService {
    queue: Arc<dyn EventQueue>,
}

impl EventService {
    #[must_use]
    pub fn new(queue: Arc<dyn EventQueue>) -> Self {
        Self { queue }
    }

    #[must_use]
    pub fn queue(&self) -> Arc<dyn EventQueue> {
        Arc::clone(&self.queue)
    }

    /// Re-pends events stuck in `processing` past `recovery_timeout`,
    /// logging how many were recovered. Run once at startup, before the
    /// hook dispatcher's loop begins, so a crash mid-dispatch never leaves
    /// an event permanently stuck.
    pub async fn recover_stuck_on_startup(&self, recovery_timeout: Duration) -> DomainResult<u64> {
        let recovered = self.queue.recover_stuck(Utc::now(), recovery_timeout).await?;
        if recovered > 0 {
            tracing::warn!(recovered, "recovered events stuck in processing at startup");
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteEventRepository};
    use crate::domain::models::{EventStatus, EventType};

    #[tokio::test]
    async fn recovers_events_stuck_past_timeout() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo: Arc<dyn EventQueue> = Arc::new(SqliteEventRepository::new(pool));
        let service = EventService::new(Arc::clone(&repo));

        let event = repo
            .enqueue(EventType::CpuHigh, "agent-a", serde_json::json!({}))
            .await
            .unwrap();
        repo.claim(event.id).await.unwrap();

        let recovered = service.recover_stuck_on_startup(Duration::from_secs(0)).await.unwrap();
        assert_eq!(recovered, 1);

        let refreshed = repo.get_event(event.id).await.unwrap();
        assert_eq!(refreshed.status, EventStatus::Pending);
    }
}
