//! Agent-group orchestrator port — spec.md §4.9.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AgentGroup, AutoDiscoveryConfig, GroupHierarchy, GroupTemplate};

#[async_trait]
pub trait GroupRepository: Send + Sync {
    async fn create(&self, group: &AgentGroup) -> DomainResult<()>;
    async fn get(&self, id: &str) -> DomainResult<AgentGroup>;
    async fn update(&self, group: &AgentGroup) -> DomainResult<()>;
    /// CASCADE deletes membership; hierarchy rows are handled separately
    /// per the Open Question resolution documented in DESIGN.md.
    async fn delete(&self, id: &str) -> DomainResult<()>;
    async fn list(&self) -> DomainResult<Vec<AgentGroup>>;

    async fn get_hierarchy(&self, group_id: &str) -> DomainResult<Option<GroupHierarchy>>;
    async fn set_parent(&self, node: &GroupHierarchy) -> DomainResult<()>;
    /// Walk the chain from `group_id` up to the root, following `parent_id`.
    async fn hierarchy_chain(&self, group_id: &str) -> DomainResult<Vec<GroupHierarchy>>;
    /// All direct children of `group_id`.
    async fn hierarchy_children(&self, group_id: &str) -> DomainResult<Vec<GroupHierarchy>>;
    async fn delete_hierarchy_node(&self, group_id: &str) -> DomainResult<()>;

    async fn create_template(&self, template: &GroupTemplate) -> DomainResult<()>;
    async fn get_template(&self, id: Uuid) -> DomainResult<GroupTemplate>;
    async fn list_templates(&self) -> DomainResult<Vec<GroupTemplate>>;
    async fn delete_template(&self, id: Uuid) -> DomainResult<()>;

    async fn create_auto_discovery(&self, config: &AutoDiscoveryConfig) -> DomainResult<()>;
    async fn list_auto_discovery(&self) -> DomainResult<Vec<AutoDiscoveryConfig>>;
    async fn update_auto_discovery_last_run(&self, id: Uuid, run_at: chrono::DateTime<chrono::Utc>) -> DomainResult<()>;
}
