//! SQLite implementation of `WebhookRepository` — spec.md §4.9.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Webhook, WebhookEvent, WebhookLog};
use crate::domain::ports::WebhookRepository;

#[derive(Clone)]
pub struct SqliteWebhookRepository {
    pool: SqlitePool,
}

impl SqliteWebhookRepository {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookRepository for SqliteWebhookRepository {
    async fn create(&self, webhook: &Webhook) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO webhooks (id, url, events, enabled, secret, headers, retry_count, timeout_seconds)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(webhook.id.to_string())
        .bind(&webhook.url)
        .bind(encode_events(&webhook.events)?)
        .bind(i64::from(webhook.enabled))
        .bind(&webhook.secret)
        .bind(serde_json::to_string(&webhook.headers)?)
        .bind(i64::from(webhook.retry_count))
        .bind(i64::try_from(webhook.timeout.as_secs()).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Webhook> {
        let row: Option<WebhookRow> = sqlx::query_as("SELECT * FROM webhooks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or_else(|| DomainError::NotFound(format!("webhook '{id}'")))?
            .try_into()
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM webhooks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("webhook '{id}'")));
        }
        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<Webhook>> {
        let rows: Vec<WebhookRow> = sqlx::query_as("SELECT * FROM webhooks ORDER BY url")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_active_for_event(&self, event: WebhookEvent) -> DomainResult<Vec<Webhook>> {
        let rows: Vec<WebhookRow> = sqlx::query_as("SELECT * FROM webhooks WHERE enabled = 1")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(TryInto::try_into)
            .collect::<DomainResult<Vec<Webhook>>>()
            .map(|webhooks| {
                webhooks
                    .into_iter()
                    .filter(|webhook| webhook.subscribes_to(event))
                    .collect()
            })
    }

    async fn append_log(&self, log: &WebhookLog) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO webhook_logs (webhook_id, event_type, group_id, success, status_code,
             error, retry_count, timestamp) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(log.webhook_id.to_string())
        .bind(log.event_type.as_str())
        .bind(&log.group_id)
        .bind(i64::from(log.success))
        .bind(log.status_code.map(i64::from))
        .bind(&log.error)
        .bind(i64::from(log.retry_count))
        .bind(log.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn encode_events(events: &[WebhookEvent]) -> DomainResult<String> {
    Ok(serde_json::to_string(events)?)
}

#[derive(sqlx::FromRow)]
struct WebhookRow {
    id: String,
    url: String,
    events: String,
    enabled: i64,
    secret: String,
    headers: String,
    retry_count: i64,
    timeout_seconds: i64,
}

impl TryFrom<WebhookRow> for Webhook {
    type Error = DomainError;

    fn try_from(row: WebhookRow) -> Result<Self, Self::Error> {
        Ok(Webhook {
            id: super::parse_uuid(&row.id)?,
            url: row.url,
            events: serde_json::from_str::<Vec<WebhookEvent>>(&row.events)?,
            enabled: row.enabled != 0,
            secret: row.secret,
            headers: serde_json::from_str::<HashMap<String, String>>(&row.headers)?,
            retry_count: u32::try_from(row.retry_count).unwrap_or(0),
            timeout: Duration::from_secs(u64::try_from(row.timeout_seconds).unwrap_or(10)),
        })
    }
}
