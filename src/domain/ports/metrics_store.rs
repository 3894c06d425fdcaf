//! Metrics store port — spec.md §4.5.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::DomainResult;
use crate::domain::models::{AgentMetric, MetricPoint};

#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Append a batch of already-buffered points in one transaction.
    async fn write_batch(&self, points: &[AgentMetric]) -> DomainResult<()>;

    /// Downsampled history in `[start, end]`. When `max_points > 0` and the
    /// row count exceeds it, returns every Nth row where
    /// `N = floor(total / max_points)`; otherwise all rows ascending.
    async fn get_history(
        &self,
        agent: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_points: u32,
    ) -> DomainResult<Vec<MetricPoint>>;

    async fn get_latest(&self, agent: &str) -> DomainResult<Option<MetricPoint>>;

    async fn get_agent_names(&self) -> DomainResult<Vec<String>>;

    /// Bulk-delete rows older than `older_than`.
    async fn cleanup(&self, older_than: DateTime<Utc>) -> DomainResult<u64>;
}
