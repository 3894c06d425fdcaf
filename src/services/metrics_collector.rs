//! Metrics collector — spec.md §4.6.
//!
//! A ticking loop over the fleet list: each cycle is sliced into
//! `batch_concurrency`-sized chunks dispatched concurrently, with a fixed
//! pause between chunks, and a per-agent timeout so one unreachable host
//! never stalls the cycle. A second ticking loop runs retention cleanup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Agent, MetricPoint};
use crate::services::metrics_buffer::BufferedMetricsStore;

/// Supplies the current fleet. Spec.md §4.6: "the agent list is cached for
/// up to 5 minutes when its size is unchanged between cycles" — the cache
/// lives here rather than in the provider so any `FleetListProvider` gets it
/// for free.
#[async_trait]
pub trait FleetListProvider: Send + Sync {
    async fn list_agents(&self) -> DomainResult<Vec<Agent>>;
}

#[async_trait]
impl FleetListProvider for crate::services::registry::RegistryService {
    async fn list_agents(&self) -> DomainResult<Vec<Agent>> {
        self.list().await
    }
}

/// One agent's telemetry RPC, abstracted so the collector can be exercised
/// with a fake in tests without a live gRPC fleet. Implementations are
/// expected to bound their own work to `timeout` (the production
/// `services::telemetry_client::GrpcTelemetryClient` does so via
/// `tokio::time::timeout` around the pooled RPC call).
#[async_trait]
pub trait AgentTelemetryClient: Send + Sync {
    async fn get_resource_usage(&self, address: &str, timeout: Duration) -> DomainResult<MetricPoint>;
}

struct CachedFleet {
    agents: Vec<Agent>,
    cached_at: std::time::Instant,
}

pub struct MetricsCollector<P, C> {
    fleet: Arc<P>,
    client: Arc<C>,
    store: Arc<BufferedMetricsStore>,
    interval: Duration,
    per_agent_timeout: Duration,
    batch_concurrency: usize,
    retention: chrono::Duration,
    cleanup_period: Duration,
    cache: Mutex<Option<CachedFleet>>,
    cache_ttl: Duration,
    running: AtomicBool,
    cancellation: Mutex<Option<CancellationToken>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<P, C> MetricsCollector<P, C>
where
    P: FleetListProvider + 'static,
    C: AgentTelemetryClient + 'static,
{
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fleet: Arc<P>,
        client: Arc<C>,
        store: Arc<BufferedMetricsStore>,
        interval: Duration,
        per_agent_timeout: Duration,
        batch_concurrency: usize,
        retention_days: i64,
        cleanup_period: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            fleet,
            client,
            store,
            interval,
            per_agent_timeout,
            batch_concurrency: batch_concurrency.max(1),
            retention: chrono::Duration::days(retention_days),
            cleanup_period,
            cache: Mutex::new(None),
            cache_ttl: Duration::from_secs(5 * 60),
            running: AtomicBool::new(false),
            cancellation: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
        })
    }

    async fn fleet_snapshot(&self) -> DomainResult<Vec<Agent>> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.cached_at.elapsed() < self.cache_ttl {
                let fresh = self.fleet.list_agents().await?;
                if fresh.len() == cached.agents.len() {
                    return Ok(cached.agents.clone());
                }
                let snapshot = fresh.clone();
                *cache = Some(CachedFleet {
                    agents: fresh,
                    cached_at: std::time::Instant::now(),
                });
                return Ok(snapshot);
            }
        }
        let agents = self.fleet.list_agents().await?;
        *cache = Some(CachedFleet {
            agents: agents.clone(),
            cached_at: std::time::Instant::now(),
        });
        Ok(agents)
    }

    /// Idempotent: calling `start` while already running is a no-op.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let token = CancellationToken::new();
        *self.cancellation.lock().await = Some(token.clone());

        let collect = Arc::clone(self);
        let collect_token = token.clone();
        let collect_handle = tokio::spawn(async move { collect.collect_loop(collect_token).await });

        let cleanup = Arc::clone(self);
        let cleanup_handle = tokio::spawn(async move { cleanup.cleanup_loop(token).await });

        *self.handles.lock().await = vec![collect_handle, cleanup_handle];
        tracing::info!("metrics collector started");
    }

    /// Idempotent: calling `stop` while already stopped is a no-op.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(token) = self.cancellation.lock().await.take() {
            token.cancel();
        }
        for handle in self.handles.lock().await.drain(..) {
            let _ = handle.await;
        }
        tracing::info!("metrics collector stopped");
    }

    async fn collect_loop(self: Arc<Self>, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_cycle(&token).await,
                () = token.cancelled() => break,
            }
        }
    }

    async fn cleanup_loop(self: Arc<Self>, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.cleanup_period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let cutoff = Utc::now() - self.retention;
                    match self.store.cleanup(cutoff).await {
                        Ok(deleted) => tracing::info!(deleted, "metrics retention cleanup"),
                        Err(err) => tracing::error!(error = %err, "metrics retention cleanup failed"),
                    }
                }
                () = token.cancelled() => break,
            }
        }
    }

    #[instrument(skip(self, token))]
    async fn run_cycle(&self, token: &CancellationToken) {
        let agents = match self.fleet_snapshot().await {
            Ok(agents) => agents,
            Err(err) => {
                tracing::error!(error = %err, "failed to list fleet for metrics cycle");
                return;
            }
        };

        for batch in agents.chunks(self.batch_concurrency) {
            if token.is_cancelled() {
                return;
            }
            let tasks: Vec<_> = batch
                .iter()
                .map(|agent| {
                    let client = Arc::clone(&self.client);
                    let store = Arc::clone(&self.store);
                    let name = agent.name.clone();
                    let address = agent.address.clone();
                    let timeout = self.per_agent_timeout;
                    let token = token.clone();
                    tokio::spawn(async move {
                        let outcome = tokio::select! {
                            result = client.get_resource_usage(&address, timeout) => result,
                            () = token.cancelled() => return,
                        };
                        match outcome {
                            Ok(point) => {
                                if let Err(err) = store.push(name.clone(), point).await {
                                    tracing::error!(agent = %name, error = %err, "failed to buffer metric point");
                                }
                            }
                            Err(err) => {
                                tracing::warn!(agent = %name, error = %err, "telemetry RPC failed");
                            }
                        }
                    })
                })
                .collect();

            for task in tasks {
                let _ = task.await;
            }
            if !token.is_cancelled() {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteMetricsRepository};
    use crate::domain::errors::DomainError;
    use crate::domain::ports::MetricsStore;

    struct FixedFleet(Vec<Agent>);

    #[async_trait]
    impl FleetListProvider for FixedFleet {
        async fn list_agents(&self) -> DomainResult<Vec<Agent>> {
            Ok(self.0.clone())
        }
    }

    struct FakeTelemetry {
        hang: String,
    }

    #[async_trait]
    impl AgentTelemetryClient for FakeTelemetry {
        async fn get_resource_usage(&self, address: &str, timeout: Duration) -> DomainResult<MetricPoint> {
            let hang = address == self.hang;
            let work = async move {
                if hang {
                    tokio::time::sleep(timeout * 10).await;
                }
                Ok(MetricPoint {
                    timestamp: Utc::now(),
                    cpu_percent: 10.0,
                    memory_percent: 20.0,
                    memory_used_bytes: 1,
                    disk_percent: 5.0,
                    load_avg_1: 0.1,
                    load_avg_5: 0.1,
                    load_avg_15: 0.1,
                    process_count: 1,
                    network_rx_bytes: None,
                    network_tx_bytes: None,
                })
            };
            tokio::time::timeout(timeout, work)
                .await
                .map_err(|_| DomainError::Timeout(timeout))?
        }
    }

    #[tokio::test]
    async fn collector_skips_timed_out_agent_without_aborting_cycle() {
        let pool = create_migrated_test_pool().await.unwrap();
        let store: Arc<dyn MetricsStore> = Arc::new(SqliteMetricsRepository::new(pool));
        let buffered = BufferedMetricsStore::new(store, 1, Duration::from_secs(3600));

        let fleet = Arc::new(FixedFleet(vec![
            Agent::register("a", "10.0.0.1:1", "1.0.0"),
            Agent::register("b", "10.0.0.2:1", "1.0.0"),
            Agent::register("c", "10.0.0.3:1", "1.0.0"),
        ]));
        let client = Arc::new(FakeTelemetry {
            hang: "10.0.0.2:1".to_string(),
        });

        let collector = MetricsCollector::new(
            fleet,
            client,
            Arc::clone(&buffered),
            Duration::from_secs(3600),
            Duration::from_millis(20),
            2,
            7,
            Duration::from_secs(3600),
        );
        collector.run_cycle(&CancellationToken::new()).await;

        assert!(buffered.get_latest("a").await.unwrap().is_some());
        assert!(buffered.get_latest("b").await.unwrap().is_none());
        assert!(buffered.get_latest("c").await.unwrap().is_some());

        buffered.close().await.unwrap();
    }

    #[tokio::test]
    async fn start_stop_is_idempotent() {
        let pool = create_migrated_test_pool().await.unwrap();
        let store: Arc<dyn MetricsStore> = Arc::new(SqliteMetricsRepository::new(pool));
        let buffered = BufferedMetricsStore::new(store, 10, Duration::from_secs(3600));
        let fleet = Arc::new(FixedFleet(vec![]));
        let client = Arc::new(FakeTelemetry { hang: String::new() });

        let collector = MetricsCollector::new(
            fleet,
            client,
            Arc::clone(&buffered),
            Duration::from_secs(3600),
            Duration::from_millis(50),
            2,
            7,
            Duration::from_secs(3600),
        );
        collector.start().await;
        collector.start().await;
        collector.stop().await;
        collector.stop().await;
        buffered.close().await.unwrap();
    }
}
