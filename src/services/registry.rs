//! Agent fleet registry service — spec.md §4.4.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::instrument;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Agent, AgentStatus};
use crate::domain::ports::AgentRepository;

/// Wraps an `AgentRepository` with the staleness-derived status view spec.md
/// §4.4 requires of `List`/`Get`: an agent's reported `status` is always the
/// one derived from `last_heartbeat` at read time, not the stored snapshot.
#[derive(Clone)]
pub struct RegistryService {
    repo: Arc<dyn AgentRepository>,
    staleness: chrono::Duration,
}

impl RegistryService {
    #[must_use]
    pub fn new(repo: Arc<dyn AgentRepository>, staleness: Duration) -> Self {
        Self {
            repo,
            staleness: chrono::Duration::from_std(staleness).unwrap_or_else(|_| chrono::Duration::minutes(5)),
        }
    }

    #[instrument(skip(self))]
    pub async fn register(&self, name: &str, address: &str, agent_version: &str) -> DomainResult<Agent> {
        let agent = self.repo.upsert(name, address, agent_version).await?;
        tracing::info!(agent = %name, %address, "agent registered");
        Ok(agent)
    }

    #[instrument(skip(self))]
    pub async fn heartbeat(&self, name: &str) -> DomainResult<()> {
        self.repo.heartbeat(name).await
    }

    /// All agents, ordered by name, each with `status` overwritten by the
    /// staleness-derived effective status.
    pub async fn list(&self) -> DomainResult<Vec<Agent>> {
        let now = Utc::now();
        let mut agents = self.repo.list().await?;
        for agent in &mut agents {
            agent.status = agent.effective_status(now, self.staleness);
        }
        Ok(agents)
    }

    pub async fn get(&self, name: &str) -> DomainResult<Agent> {
        let mut agent = self.repo.get(name).await?;
        agent.status = agent.effective_status(Utc::now(), self.staleness);
        Ok(agent)
    }

    pub async fn delete(&self, name: &str) -> DomainResult<()> {
        self.repo.delete(name).await
    }

    pub async fn update_system_info(&self, name: &str, doc: JsonValue) -> DomainResult<()> {
        self.repo.update_system_info(name, doc).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteAgentRepository};

    async fn service() -> RegistryService {
        let pool = create_migrated_test_pool().await.unwrap();
        RegistryService::new(Arc::new(SqliteAgentRepository::new(pool)), Duration::from_secs(300))
    }

    #[tokio::test]
    async fn list_reflects_active_status_right_after_registration() {
        let svc = service().await;
        svc.register("worker-1", "10.0.0.1:9000", "1.0.0").await.unwrap();
        let agents = svc.list().await.unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].status, AgentStatus::Active);
    }

    #[tokio::test]
    async fn get_unknown_agent_is_not_found() {
        let svc = service().await;
        let err = svc.get("ghost").await.unwrap_err();
        assert!(matches!(err, crate::domain::errors::DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_removes_agent_from_subsequent_list() {
        let svc = service().await;
        svc.register("worker-1", "10.0.0.1:9000", "1.0.0").await.unwrap();
        svc.delete("worker-1").await.unwrap();
        assert!(svc.list().await.unwrap().is_empty());
    }
}
