//! Watcher facade — spec.md §4.10. Watchers live entirely on the agent side;
//! the daemon only proxies the four watcher RPCs through the same
//! connection pool and circuit breakers used for telemetry and bulk
//! operations, plus a fan-out `list_all` for the "watchers across the
//! fleet" view.

use std::sync::Arc;
use std::time::Duration;

use tonic::transport::Channel;

use crate::domain::errors::DomainResult;
use crate::domain::ports::AgentRepository;
use crate::grpc::client::{AgentClient, AgentClientDialer};
use crate::grpc::generated::WatcherInfo;
use crate::reliability::circuit_breaker::{self, CircuitBreakerManager};
use crate::reliability::pool::ConnectionPool;

pub struct WatcherFacade {
    agents: Arc<dyn AgentRepository>,
    pool: Arc<ConnectionPool<Channel, AgentClientDialer>>,
    breakers: Arc<CircuitBreakerManager>,
    call_timeout: Duration,
}

impl WatcherFacade {
    #[must_use]
    pub fn new(
        agents: Arc<dyn AgentRepository>,
        pool: Arc<ConnectionPool<Channel, AgentClientDialer>>,
        breakers: Arc<CircuitBreakerManager>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            agents,
            pool,
            breakers,
            call_timeout,
        }
    }

    async fn client_for(&self, agent_name: &str) -> DomainResult<AgentClient> {
        let agent = self.agents.get(agent_name).await?;
        let channel = self.pool.acquire(&agent.address).await?;
        Ok(AgentClient::new(channel))
    }

    pub async fn register_watcher(&self, agent_name: &str, kind: &str, target: &str, config_json: &str) -> DomainResult<String> {
        let breaker = self.breakers.get_or_create(agent_name).await;
        let client = self.client_for(agent_name).await?;
        circuit_breaker::execute(&breaker, || async move { client.register_watcher(kind, target, config_json).await }).await
    }

    pub async fn list_watchers(&self, agent_name: &str) -> DomainResult<Vec<WatcherInfo>> {
        let breaker = self.breakers.get_or_create(agent_name).await;
        let client = self.client_for(agent_name).await?;
        circuit_breaker::execute(&breaker, || async move { client.list_watchers().await }).await
    }

    pub async fn get_watcher(&self, agent_name: &str, watcher_id: &str) -> DomainResult<WatcherInfo> {
        let breaker = self.breakers.get_or_create(agent_name).await;
        let client = self.client_for(agent_name).await?;
        circuit_breaker::execute(&breaker, || async move { client.get_watcher(watcher_id).await }).await
    }

    pub async fn remove_watcher(&self, agent_name: &str, watcher_id: &str) -> DomainResult<()> {
        let breaker = self.breakers.get_or_create(agent_name).await;
        let client = self.client_for(agent_name).await?;
        circuit_breaker::execute(&breaker, || async move { client.remove_watcher(watcher_id).await }).await
    }

    /// Lists watchers across every registered agent, silently skipping
    /// agents that are unreachable (disconnected agents should not fail the
    /// whole fleet-wide view).
    pub async fn list_all(&self) -> DomainResult<Vec<(String, WatcherInfo)>> {
        let agents = self.agents.list().await?;
        let mut all = Vec::new();
        for agent in agents {
            match tokio::time::timeout(self.call_timeout, self.list_watchers(&agent.name)).await {
                Ok(Ok(watchers)) => {
                    all.extend(watchers.into_iter().map(|w| (agent.name.clone(), w)));
                }
                Ok(Err(err)) => {
                    tracing::debug!(agent = %agent.name, error = %err, "skipping unreachable agent in fleet-wide watcher list");
                }
                Err(_) => {
                    tracing::debug!(agent = %agent.name, "watcher list timed out, skipping");
                }
            }
        }
        Ok(all)
    }
}
