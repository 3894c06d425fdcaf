//! SQLite implementation of `MetricsStore` — spec.md §4.5/§4.6.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AgentMetric, MetricPoint};
use crate::domain::ports::MetricsStore;

#[derive(Clone)]
pub struct SqliteMetricsRepository {
    pool: SqlitePool,
}

impl SqliteMetricsRepository {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricsStore for SqliteMetricsRepository {
    async fn write_batch(&self, points: &[AgentMetric]) -> DomainResult<()> {
        if points.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for m in points {
            let mut p = m.point;
            p.clamp_percentages();
            sqlx::query(
                "INSERT INTO metric_points (agent_name, timestamp, cpu_percent, memory_percent,
                 memory_used_bytes, disk_percent, load_avg_1, load_avg_5, load_avg_15,
                 process_count, network_rx_bytes, network_tx_bytes)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&m.agent_name)
            .bind(p.timestamp.to_rfc3339())
            .bind(p.cpu_percent)
            .bind(p.memory_percent)
            .bind(i64::try_from(p.memory_used_bytes).unwrap_or(i64::MAX))
            .bind(p.disk_percent)
            .bind(p.load_avg_1)
            .bind(p.load_avg_5)
            .bind(p.load_avg_15)
            .bind(i64::from(p.process_count))
            .bind(p.network_rx_bytes.and_then(|v| i64::try_from(v).ok()))
            .bind(p.network_tx_bytes.and_then(|v| i64::try_from(v).ok()))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_history(
        &self,
        agent: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_points: u32,
    ) -> DomainResult<Vec<MetricPoint>> {
        let rows: Vec<MetricRow> = sqlx::query_as(
            "SELECT timestamp, cpu_percent, memory_percent, memory_used_bytes, disk_percent,
             load_avg_1, load_avg_5, load_avg_15, process_count, network_rx_bytes, network_tx_bytes
             FROM metric_points WHERE agent_name = ? AND timestamp >= ? AND timestamp <= ?
             ORDER BY timestamp ASC",
        )
        .bind(agent)
        .bind(start.to_rfc3339())
        .bind(end.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        let all: Vec<MetricPoint> = rows.into_iter().map(TryInto::try_into).collect::<DomainResult<_>>()?;

        if max_points == 0 || (all.len() as u32) <= max_points {
            return Ok(all);
        }

        let step = all.len() / max_points as usize;
        Ok(all.into_iter().step_by(step.max(1)).collect())
    }

    async fn get_latest(&self, agent: &str) -> DomainResult<Option<MetricPoint>> {
        let row: Option<MetricRow> = sqlx::query_as(
            "SELECT timestamp, cpu_percent, memory_percent, memory_used_bytes, disk_percent,
             load_avg_1, load_avg_5, load_avg_15, process_count, network_rx_bytes, network_tx_bytes
             FROM metric_points WHERE agent_name = ? ORDER BY timestamp DESC LIMIT 1",
        )
        .bind(agent)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn get_agent_names(&self) -> DomainResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT DISTINCT agent_name FROM metric_points ORDER BY agent_name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(n,)| n).collect())
    }

    async fn cleanup(&self, older_than: DateTime<Utc>) -> DomainResult<u64> {
        let result = sqlx::query("DELETE FROM metric_points WHERE timestamp < ?")
            .bind(older_than.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct MetricRow {
    timestamp: String,
    cpu_percent: f64,
    memory_percent: f64,
    memory_used_bytes: i64,
    disk_percent: f64,
    load_avg_1: f64,
    load_avg_5: f64,
    load_avg_15: f64,
    process_count: i64,
    network_rx_bytes: Option<i64>,
    network_tx_bytes: Option<i64>,
}

impl TryFrom<MetricRow> for MetricPoint {
    type Error = crate::domain::errors::DomainError;

    fn try_from(row: MetricRow) -> Result<Self, Self::Error> {
        Ok(MetricPoint {
            timestamp: super::parse_datetime(&row.timestamp)?,
            cpu_percent: row.cpu_percent,
            memory_percent: row.memory_percent,
            memory_used_bytes: u64::try_from(row.memory_used_bytes).unwrap_or(0),
            disk_percent: row.disk_percent,
            load_avg_1: row.load_avg_1,
            load_avg_5: row.load_avg_5,
            load_avg_15: row.load_avg_15,
            process_count: u32::try_from(row.process_count).unwrap_or(0),
            network_rx_bytes: row.network_rx_bytes.and_then(|v| u64::try_from(v).ok()),
            network_tx_bytes: row.network_tx_bytes.and_then(|v| u64::try_from(v).ok()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    fn point(ts: DateTime<Utc>, cpu: f64) -> MetricPoint {
        MetricPoint {
            timestamp: ts,
            cpu_percent: cpu,
            memory_percent: 10.0,
            memory_used_bytes: 1024,
            disk_percent: 5.0,
            load_avg_1: 0.1,
            load_avg_5: 0.1,
            load_avg_15: 0.1,
            process_count: 5,
            network_rx_bytes: Some(100),
            network_tx_bytes: Some(200),
        }
    }

    #[tokio::test]
    async fn write_batch_then_get_latest() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteMetricsRepository::new(pool);
        let now = Utc::now();
        repo.write_batch(&[AgentMetric { agent_name: "a1".into(), point: point(now, 50.0) }])
            .await
            .unwrap();
        let latest = repo.get_latest("a1").await.unwrap().unwrap();
        assert_eq!(latest.cpu_percent, 50.0);
    }

    #[tokio::test]
    async fn get_history_downsamples_when_over_max_points() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteMetricsRepository::new(pool);
        let base = Utc::now() - chrono::Duration::minutes(100);
        let mut batch = Vec::new();
        for i in 0..100 {
            batch.push(AgentMetric {
                agent_name: "a1".into(),
                point: point(base + chrono::Duration::minutes(i), f64::from(i)),
            });
        }
        repo.write_batch(&batch).await.unwrap();

        let history = repo
            .get_history("a1", base, Utc::now(), 10)
            .await
            .unwrap();
        assert!(history.len() <= 10);
    }

    #[tokio::test]
    async fn cleanup_deletes_rows_older_than_cutoff() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteMetricsRepository::new(pool);
        let old = Utc::now() - chrono::Duration::days(10);
        repo.write_batch(&[AgentMetric { agent_name: "a1".into(), point: point(old, 1.0) }])
            .await
            .unwrap();
        let deleted = repo.cleanup(Utc::now() - chrono::Duration::days(1)).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(repo.get_latest("a1").await.unwrap().is_none());
    }
}
