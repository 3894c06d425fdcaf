//! Batched metrics ingestion — spec.md §4.5.
//!
//! All buffer access is serialized by a single async mutex: a push that
//! fills the batch flushes inline; an idle buffer is flushed by a ticking
//! background task on `flush_interval`, whichever comes first.

use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AgentMetric, MetricPoint};
use crate::domain::ports::MetricsStore;

pub struct BufferedMetricsStore {
    store: Arc<dyn MetricsStore>,
    buffer: Mutex<Vec<AgentMetric>>,
    batch_size: usize,
    flush_interval: Duration,
    flusher: StdMutex<Option<JoinHandle<()>>>,
    cancellation: CancellationToken,
}

impl BufferedMetricsStore {
    #[must_use]
    pub fn new(store: Arc<dyn MetricsStore>, batch_size: usize, flush_interval: Duration) -> Arc<Self> {
        let this = Arc::new(Self {
            store,
            buffer: Mutex::new(Vec::with_capacity(batch_size)),
            batch_size: batch_size.max(1),
            flush_interval,
            flusher: StdMutex::new(None),
            cancellation: CancellationToken::new(),
        });

        let worker = Arc::clone(&this);
        let handle = tokio::spawn(async move { worker.flush_loop().await });
        *this.flusher.lock().unwrap() = Some(handle);
        this
    }

    async fn flush_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.flush().await {
                        tracing::warn!(error = %err, "timed metrics flush failed");
                    }
                }
                () = self.cancellation.cancelled() => break,
            }
        }
    }

    #[instrument(skip(self, point))]
    pub async fn push(&self, agent_name: impl Into<String>, point: MetricPoint) -> DomainResult<()> {
        let metric = AgentMetric {
            agent_name: agent_name.into(),
            point,
        };
        let mut buffer = self.buffer.lock().await;
        buffer.push(metric);
        if buffer.len() >= self.batch_size {
            let batch = std::mem::take(&mut *buffer);
            drop(buffer);
            self.store.write_batch(&batch).await?;
        }
        Ok(())
    }

    pub async fn flush(&self) -> DomainResult<()> {
        let mut buffer = self.buffer.lock().await;
        if buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut *buffer);
        drop(buffer);
        self.store.write_batch(&batch).await
    }

    pub async fn get_history(
        &self,
        agent: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_points: u32,
    ) -> DomainResult<Vec<MetricPoint>> {
        self.store.get_history(agent, start, end, max_points).await
    }

    pub async fn get_latest(&self, agent: &str) -> DomainResult<Option<MetricPoint>> {
        self.store.get_latest(agent).await
    }

    pub async fn get_agent_names(&self) -> DomainResult<Vec<String>> {
        self.store.get_agent_names().await
    }

    pub async fn cleanup(&self, older_than: DateTime<Utc>) -> DomainResult<u64> {
        self.store.cleanup(older_than).await
    }

    /// Stops the flush timer and flushes whatever remains buffered, per
    /// spec.md §4.5's shutdown sequence. The caller still owns (and closes)
    /// the underlying connection pool.
    pub async fn close(&self) -> DomainResult<()> {
        self.cancellation.cancel();
        let handle = self.flusher.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteMetricsRepository};

    fn point(cpu: f64) -> MetricPoint {
        MetricPoint {
            timestamp: Utc::now(),
            cpu_percent: cpu,
            memory_percent: 10.0,
            memory_used_bytes: 1024,
            disk_percent: 5.0,
            load_avg_1: 0.1,
            load_avg_5: 0.1,
            load_avg_15: 0.1,
            process_count: 3,
            network_rx_bytes: None,
            network_tx_bytes: None,
        }
    }

    #[tokio::test]
    async fn flushes_once_batch_size_is_reached() {
        let pool = create_migrated_test_pool().await.unwrap();
        let store: Arc<dyn MetricsStore> = Arc::new(SqliteMetricsRepository::new(pool));
        let buffered = BufferedMetricsStore::new(store, 2, Duration::from_secs(3600));

        buffered.push("a1", point(10.0)).await.unwrap();
        assert!(buffered.get_latest("a1").await.unwrap().is_none());

        buffered.push("a1", point(20.0)).await.unwrap();
        assert!(buffered.get_latest("a1").await.unwrap().is_some());

        buffered.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_flushes_remaining_buffered_points() {
        let pool = create_migrated_test_pool().await.unwrap();
        let store: Arc<dyn MetricsStore> = Arc::new(SqliteMetricsRepository::new(pool));
        let buffered = BufferedMetricsStore::new(store, 10, Duration::from_secs(3600));

        buffered.push("a1", point(5.0)).await.unwrap();
        buffered.close().await.unwrap();
        assert!(buffered.get_latest("a1").await.unwrap().is_some());
    }
}
