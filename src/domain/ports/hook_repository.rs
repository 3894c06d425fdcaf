//! Hook registry port — spec.md §4.8.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Hook, HookResult};

#[async_trait]
pub trait HookRepository: Send + Sync {
    async fn create(&self, hook: &Hook) -> DomainResult<()>;
    async fn get(&self, id: Uuid) -> DomainResult<Hook>;
    async fn update(&self, hook: &Hook) -> DomainResult<()>;
    async fn delete(&self, id: Uuid) -> DomainResult<()>;
    async fn list(&self) -> DomainResult<Vec<Hook>>;
    async fn set_enabled(&self, id: Uuid, enabled: bool) -> DomainResult<()>;
    async fn increment_run_count(&self, id: Uuid) -> DomainResult<()>;

    async fn record_result(&self, result: &HookResult) -> DomainResult<()>;
    /// Recent results for a hook, newest first, for on-demand stats.
    async fn recent_results(&self, hook_id: Uuid, limit: i64) -> DomainResult<Vec<HookResult>>;
}
