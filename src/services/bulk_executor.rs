//! Bulk agent executor — spec.md §4.9 "Bulk Operations". Dispatches one
//! `BulkOperation` against one agent, routed through that agent's circuit
//! breaker and the shared connection pool, bounded by the operation's
//! per-agent timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::Channel;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::BulkOperationKind;
use crate::grpc::client::{AgentClient, AgentClientDialer};
use crate::reliability::circuit_breaker::{self, CircuitBreakerManager};
use crate::reliability::pool::ConnectionPool;

/// Test seam so `GroupOrchestrator` can be exercised against a fake instead
/// of a live agent fleet, mirroring `AgentTelemetryClient`.
#[async_trait]
pub trait BulkAgentExecutor: Send + Sync {
    async fn execute(
        &self,
        address: &str,
        kind: BulkOperationKind,
        params: &serde_json::Value,
        timeout: Duration,
    ) -> DomainResult<Option<String>>;
}

pub struct GrpcBulkExecutor {
    pool: Arc<ConnectionPool<Channel, AgentClientDialer>>,
    breakers: Arc<CircuitBreakerManager>,
}

impl GrpcBulkExecutor {
    #[must_use]
    pub fn new(pool: Arc<ConnectionPool<Channel, AgentClientDialer>>, breakers: Arc<CircuitBreakerManager>) -> Self {
        Self { pool, breakers }
    }
}

#[async_trait]
impl BulkAgentExecutor for GrpcBulkExecutor {
    async fn execute(
        &self,
        address: &str,
        kind: BulkOperationKind,
        params: &serde_json::Value,
        timeout: Duration,
    ) -> DomainResult<Option<String>> {
        let breaker = self.breakers.get_or_create(address).await;
        let pool = Arc::clone(&self.pool);
        let address = address.to_string();
        let params = params.clone();

        circuit_breaker::execute(&breaker, move || {
            let pool = Arc::clone(&pool);
            let address = address.clone();
            let params = params.clone();
            async move {
                let channel = pool.acquire(&address).await?;
                let client = AgentClient::new(channel);
                let call = run_kind(&client, kind, &params, timeout);
                tokio::time::timeout(timeout, call)
                    .await
                    .map_err(|_| DomainError::Timeout(timeout))?
            }
        })
        .await
    }
}

async fn run_kind(
    client: &AgentClient,
    kind: BulkOperationKind,
    params: &serde_json::Value,
    timeout: Duration,
) -> DomainResult<Option<String>> {
    match kind {
        BulkOperationKind::ExecuteCommand => {
            let command = params
                .get("command")
                .and_then(|v| v.as_str())
                .ok_or_else(|| DomainError::Validation("execute_command requires params.command".to_string()))?;
            let (stdout, stderr, exit_code) = client.run_command(command, timeout).await?;
            if exit_code == 0 {
                Ok(Some(stdout))
            } else {
                Err(DomainError::Fatal(format!("command exited {exit_code}: {stderr}")))
            }
        }
        BulkOperationKind::Restart => {
            let service_name = params
                .get("service_name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| DomainError::Validation("restart requires params.service_name".to_string()))?;
            client.restart_service(service_name).await?;
            Ok(None)
        }
        BulkOperationKind::Update => {
            let target_version = params
                .get("target_version")
                .and_then(|v| v.as_str())
                .ok_or_else(|| DomainError::Validation("update requires params.target_version".to_string()))?;
            let force = params.get("force").and_then(|v| v.as_bool()).unwrap_or(false);
            let skip_restart = params.get("skip_restart").and_then(|v| v.as_bool()).unwrap_or(false);
            client.update_agent(target_version, force, skip_restart).await?;
            Ok(None)
        }
        BulkOperationKind::Shutdown => {
            client.shutdown().await?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedExecutor {
        result: DomainResult<Option<String>>,
    }

    #[async_trait]
    impl BulkAgentExecutor for FixedExecutor {
        async fn execute(
            &self,
            _address: &str,
            _kind: BulkOperationKind,
            _params: &serde_json::Value,
            _timeout: Duration,
        ) -> DomainResult<Option<String>> {
            match &self.result {
                Ok(output) => Ok(output.clone()),
                Err(err) => Err(clone_err(err)),
            }
        }
    }

    fn clone_err(err: &DomainError) -> DomainError {
        DomainError::Fatal(err.to_string())
    }

    #[tokio::test]
    async fn fake_executor_reports_success() {
        let executor = FixedExecutor {
            result: Ok(Some("done".to_string())),
        };
        let outcome = executor
            .execute("127.0.0.1:9000", BulkOperationKind::Shutdown, &serde_json::json!({}), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(outcome, Some("done".to_string()));
    }

    #[test]
    fn execute_command_requires_command_param() {
        let params = serde_json::json!({});
        let missing = params.get("command").and_then(|v| v.as_str());
        assert!(missing.is_none());
    }
}
