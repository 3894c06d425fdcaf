//! Agent registry port — spec.md §4.4.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::domain::errors::DomainResult;
use crate::domain::models::Agent;

/// Repository interface for the fleet registry's persistent store.
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Insert a new agent or update an existing one by name, setting
    /// `status=active`, `last_heartbeat=now`, `updated_at=now`.
    async fn upsert(&self, name: &str, address: &str, agent_version: &str) -> DomainResult<Agent>;

    /// Update `last_heartbeat` and mark the agent active. Returns `NotFound`
    /// if the name was never registered.
    async fn heartbeat(&self, name: &str) -> DomainResult<()>;

    /// All registered agents, ordered by name.
    async fn list(&self) -> DomainResult<Vec<Agent>>;

    async fn get(&self, name: &str) -> DomainResult<Agent>;

    async fn delete(&self, name: &str) -> DomainResult<()>;

    /// Replace the cached `system_info` document and set
    /// `last_info_collected=now`.
    async fn update_system_info(&self, name: &str, doc: JsonValue) -> DomainResult<()>;
}
