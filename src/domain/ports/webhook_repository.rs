//! Webhook subscription/delivery-log port — spec.md §3 "Webhook" and §4.9.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Webhook, WebhookEvent, WebhookLog};

#[async_trait]
pub trait WebhookRepository: Send + Sync {
    async fn create(&self, webhook: &Webhook) -> DomainResult<()>;
    async fn get(&self, id: Uuid) -> DomainResult<Webhook>;
    async fn delete(&self, id: Uuid) -> DomainResult<()>;
    async fn list(&self) -> DomainResult<Vec<Webhook>>;

    /// Enabled webhooks whose `events` list includes `event`.
    async fn list_active_for_event(&self, event: WebhookEvent) -> DomainResult<Vec<Webhook>>;

    async fn append_log(&self, log: &WebhookLog) -> DomainResult<()>;
}
