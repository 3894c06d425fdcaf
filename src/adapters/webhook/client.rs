//! HTTP delivery of one webhook payload — spec.md §4.9.
//!
//! One [`WebhookClient::deliver`] call is one HTTP POST attempt; the caller
//! (`services::group_orchestrator`) owns the retry/back-off loop via
//! [`crate::reliability::retrier`] and the [`WebhookLog`] bookkeeping.

use reqwest::Client;
use serde::Serialize;

use crate::domain::models::{Webhook, WebhookEvent};

/// The result of a single delivery attempt, distinct from `WebhookLog`
/// since the caller still has to decide whether to retry.
#[derive(Debug, Clone)]
pub struct WebhookDeliveryOutcome {
    pub success: bool,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

/// Thin wrapper over a shared `reqwest::Client` for posting webhook payloads.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    http: Client,
}

impl Default for WebhookClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookClient {
    #[must_use]
    pub fn new() -> Self {
        Self { http: Client::new() }
    }

    /// POST `payload` to `webhook.url` with the webhook's configured headers
    /// plus an `X-Fleet-Secret` header carrying `webhook.secret`, bounded by
    /// `webhook.timeout`.
    pub async fn deliver<T: Serialize + ?Sized>(
        &self,
        webhook: &Webhook,
        event: WebhookEvent,
        payload: &T,
    ) -> WebhookDeliveryOutcome {
        let mut request = self
            .http
            .post(&webhook.url)
            .timeout(webhook.timeout)
            .header("X-Fleet-Event", event.as_str())
            .header("X-Fleet-Secret", &webhook.secret)
            .json(payload);

        for (name, value) in &webhook.headers {
            request = request.header(name, value);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    WebhookDeliveryOutcome {
                        success: true,
                        status_code: Some(status.as_u16()),
                        error: None,
                    }
                } else {
                    WebhookDeliveryOutcome {
                        success: false,
                        status_code: Some(status.as_u16()),
                        error: Some(format!("non-success status {status}")),
                    }
                }
            }
            Err(err) => WebhookDeliveryOutcome {
                success: false,
                status_code: None,
                error: Some(err.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;
    use uuid::Uuid;

    fn webhook(url: &str) -> Webhook {
        Webhook {
            id: Uuid::new_v4(),
            url: url.to_string(),
            events: vec![WebhookEvent::GroupCreated],
            enabled: true,
            secret: "topsecret".to_string(),
            headers: HashMap::new(),
            retry_count: 3,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn successful_delivery_reports_status_code() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_header("x-fleet-event", "group.created")
            .match_header("x-fleet-secret", "topsecret")
            .with_status(200)
            .create_async()
            .await;

        let client = WebhookClient::new();
        let outcome = client
            .deliver(
                &webhook(&format!("{}/hook", server.url())),
                WebhookEvent::GroupCreated,
                &serde_json::json!({"group_id": "team-a"}),
            )
            .await;

        mock.assert_async().await;
        assert!(outcome.success);
        assert_eq!(outcome.status_code, Some(200));
    }

    #[tokio::test]
    async fn non_success_status_is_reported_as_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/hook")
            .with_status(500)
            .create_async()
            .await;

        let client = WebhookClient::new();
        let outcome = client
            .deliver(
                &webhook(&format!("{}/hook", server.url())),
                WebhookEvent::GroupCreated,
                &serde_json::json!({}),
            )
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.status_code, Some(500));
    }
}
