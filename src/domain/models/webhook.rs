//! Webhook domain model — see spec.md §3 "Webhook" and §4.9.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// The closed set of group-lifecycle events a webhook may subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEvent {
    GroupCreated,
    GroupUpdated,
    GroupDeleted,
    AgentAdded,
    AgentRemoved,
}

impl WebhookEvent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GroupCreated => "group.created",
            Self::GroupUpdated => "group.updated",
            Self::GroupDeleted => "group.deleted",
            Self::AgentAdded => "agent.added",
            Self::AgentRemoved => "agent.removed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: Uuid,
    pub url: String,
    pub events: Vec<WebhookEvent>,
    pub enabled: bool,
    pub secret: String,
    pub headers: HashMap<String, String>,
    pub retry_count: u32,
    pub timeout: Duration,
}

impl Webhook {
    #[must_use]
    pub fn subscribes_to(&self, event: WebhookEvent) -> bool {
        self.enabled && self.events.contains(&event)
    }
}

/// One delivery attempt, appended regardless of outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookLog {
    pub webhook_id: Uuid,
    pub event_type: WebhookEvent,
    pub group_id: String,
    pub success: bool,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribes_to_requires_enabled_and_event_present() {
        let webhook = Webhook {
            id: Uuid::new_v4(),
            url: "https://example.com/hook".to_string(),
            events: vec![WebhookEvent::GroupCreated],
            enabled: true,
            secret: "s3cr3t".to_string(),
            headers: HashMap::new(),
            retry_count: 3,
            timeout: Duration::from_secs(5),
        };
        assert!(webhook.subscribes_to(WebhookEvent::GroupCreated));
        assert!(!webhook.subscribes_to(WebhookEvent::AgentAdded));

        let mut disabled = webhook;
        disabled.enabled = false;
        assert!(!disabled.subscribes_to(WebhookEvent::GroupCreated));
    }
}
