//! Production `AgentTelemetryClient` — spec.md §4.6: "each per-agent task
//! acquires a connection through the Connection Pool, bounds the call with
//! the per-agent timeout, and routes through that agent's circuit breaker."

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::Channel;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::MetricPoint;
use crate::grpc::client::{AgentClient, AgentClientDialer};
use crate::grpc::generated::ResourceUsage;
use crate::reliability::circuit_breaker::{self, CircuitBreakerManager};
use crate::reliability::pool::ConnectionPool;
use crate::services::metrics_collector::AgentTelemetryClient;

pub struct GrpcTelemetryClient {
    pool: Arc<ConnectionPool<Channel, AgentClientDialer>>,
    breakers: Arc<CircuitBreakerManager>,
}

impl GrpcTelemetryClient {
    #[must_use]
    pub fn new(pool: Arc<ConnectionPool<Channel, AgentClientDialer>>, breakers: Arc<CircuitBreakerManager>) -> Self {
        Self { pool, breakers }
    }
}

#[async_trait]
impl AgentTelemetryClient for GrpcTelemetryClient {
    async fn get_resource_usage(&self, address: &str, timeout: Duration) -> DomainResult<MetricPoint> {
        let breaker = self.breakers.get_or_create(address).await;
        let pool = Arc::clone(&self.pool);
        let address = address.to_string();

        circuit_breaker::execute(&breaker, move || async move {
            let channel = pool.acquire(&address).await?;
            let client = AgentClient::new(channel);
            let usage = tokio::time::timeout(timeout, client.get_resource_usage())
                .await
                .map_err(|_| DomainError::Timeout(timeout))??;
            Ok(usage_to_point(usage))
        })
        .await
    }
}

fn usage_to_point(usage: ResourceUsage) -> MetricPoint {
    let mut point = MetricPoint {
        timestamp: chrono::Utc::now(),
        cpu_percent: usage.cpu_percent,
        memory_percent: usage.memory_percent,
        memory_used_bytes: usage.memory_used_bytes,
        disk_percent: usage.disk_percent,
        load_avg_1: usage.load_avg_1,
        load_avg_5: usage.load_avg_5,
        load_avg_15: usage.load_avg_15,
        process_count: usage.process_count,
        network_rx_bytes: None,
        network_tx_bytes: None,
    };
    point.clamp_percentages();
    point
}
