//! Connection pool — spec.md §4.3. Keyed by agent address; generic over the
//! connection type so it can host the gRPC `Channel` in production and a
//! fake connection type in tests, mirroring the lazy
//! `Arc<Mutex<Option<Channel>>>` client pattern used for remote node
//! dialing elsewhere in the pack.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainError, DomainResult};

/// Connection-level state a dialer can report back, distinct from pool
/// bookkeeping (idle/age).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Ready,
    Idle,
    Shutdown,
    TransientFailure,
}

/// Establishes new connections for a given address. Implemented against
/// `tonic::transport::Channel` in `grpc::dial`.
#[async_trait]
pub trait Dialer<T>: Send + Sync {
    async fn dial(&self, address: &str) -> DomainResult<T>;
}

struct Entry<T> {
    conn: T,
    created_at: Instant,
    last_used: Instant,
    use_count: u64,
    state: ConnState,
}

impl<T> Entry<T> {
    fn is_reusable(&self, max_age: Duration) -> bool {
        matches!(self.state, ConnState::Ready | ConnState::Idle) && self.created_at.elapsed() < max_age
    }

    fn should_sweep(&self, max_idle: Duration, max_age: Duration) -> bool {
        self.last_used.elapsed() > max_idle
            || self.created_at.elapsed() > max_age
            || matches!(self.state, ConnState::Shutdown | ConnState::TransientFailure)
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_idle: Duration,
    pub max_age: Duration,
    pub dial_timeout: Duration,
    pub sweep_interval: Duration,
    pub max_message_bytes: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: Duration::from_secs(30 * 60),
            max_age: Duration::from_secs(2 * 60 * 60),
            dial_timeout: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(5 * 60),
            max_message_bytes: 1024 * 1024,
        }
    }
}

/// Pool of connections keyed by agent address. `N` readers / one writer on
/// the address map; per-entry mutex guards `use_count`/timestamps so
/// concurrent callers for the same address never tear a connection another
/// caller just published.
pub struct ConnectionPool<T, D> {
    config: PoolConfig,
    dialer: D,
    entries: RwLock<HashMap<String, Arc<Mutex<Option<Entry<T>>>>>>,
}

impl<T, D> ConnectionPool<T, D>
where
    T: Clone + Send + Sync + 'static,
    D: Dialer<T> + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(config: PoolConfig, dialer: D) -> Self {
        Self {
            config,
            dialer,
            entries: RwLock::new(HashMap::new()),
        }
    }

    async fn entry_lock(&self, address: &str) -> Arc<Mutex<Option<Entry<T>>>> {
        if let Some(existing) = self.entries.read().await.get(address) {
            return Arc::clone(existing);
        }
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(address) {
            return Arc::clone(existing);
        }
        let slot = Arc::new(Mutex::new(None));
        entries.insert(address.to_string(), Arc::clone(&slot));
        slot
    }

    /// Return an existing connection if ready/idle and not too old;
    /// otherwise close, evict, and dial a new one under `dial_timeout`.
    pub async fn acquire(&self, address: &str) -> DomainResult<T> {
        let slot = self.entry_lock(address).await;
        let mut guard = slot.lock().await;

        if let Some(entry) = guard.as_mut() {
            if entry.is_reusable(self.config.max_age) {
                entry.last_used = Instant::now();
                entry.use_count += 1;
                return Ok(entry.conn.clone());
            }
            *guard = None;
        }

        let conn = tokio::time::timeout(self.config.dial_timeout, self.dialer.dial(address))
            .await
            .map_err(|_| DomainError::Timeout(self.config.dial_timeout))??;

        let now = Instant::now();
        *guard = Some(Entry {
            conn: conn.clone(),
            created_at: now,
            last_used: now,
            use_count: 1,
            state: ConnState::Ready,
        });
        Ok(conn)
    }

    /// Mark the connection at `address` as failed so the next acquire
    /// redials instead of reusing it.
    pub async fn mark_failed(&self, address: &str) {
        if let Some(slot) = self.entries.read().await.get(address) {
            if let Some(entry) = slot.lock().await.as_mut() {
                entry.state = ConnState::TransientFailure;
            }
        }
    }

    pub async fn close(&self, address: &str) {
        if let Some(slot) = self.entries.write().await.remove(address) {
            *slot.lock().await = None;
        }
    }

    /// Releases all entries; the internal map is empty afterward.
    pub async fn close_all(&self) {
        let mut entries = self.entries.write().await;
        for slot in entries.values() {
            *slot.lock().await = None;
        }
        entries.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// One sweep pass: closes every connection idle beyond `max_idle`, aged
    /// beyond `max_age`, or in a terminal connection state. Intended to be
    /// called on a 5-minute ticker by the owning service.
    pub async fn sweep_once(&self) {
        let addresses: Vec<String> = self.entries.read().await.keys().cloned().collect();
        for address in addresses {
            let slot = match self.entries.read().await.get(&address) {
                Some(s) => Arc::clone(s),
                None => continue,
            };
            let mut guard = slot.lock().await;
            let evict = guard
                .as_ref()
                .is_some_and(|e| e.should_sweep(self.config.max_idle, self.config.max_age));
            if evict {
                *guard = None;
            }
        }
    }

    /// The long-lived sweeper loop required by spec.md §4.3/§5: ticks every
    /// `sweep_interval` (default 5 min) and calls `sweep_once`, terminating
    /// when `token` is cancelled. Intended to be spawned once by the owning
    /// service's startup wiring, alongside the collector/dispatcher loops.
    pub async fn run_sweep_loop(self: Arc<Self>, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep_once().await,
                () = token.cancelled() => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Clone)]
    struct FakeConn(u32);

    struct CountingDialer {
        dials: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Dialer<FakeConn> for CountingDialer {
        async fn dial(&self, _address: &str) -> DomainResult<FakeConn> {
            let n = self.dials.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(FakeConn(n))
        }
    }

    #[tokio::test]
    async fn acquire_reuses_existing_ready_connection() {
        let dials = Arc::new(AtomicU32::new(0));
        let pool = ConnectionPool::new(
            PoolConfig::default(),
            CountingDialer { dials: Arc::clone(&dials) },
        );
        let a = pool.acquire("10.0.0.1:9000").await.unwrap();
        let b = pool.acquire("10.0.0.1:9000").await.unwrap();
        assert_eq!(a.0, b.0);
        assert_eq!(dials.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn acquire_dials_fresh_connections_for_different_addresses() {
        let dials = Arc::new(AtomicU32::new(0));
        let pool = ConnectionPool::new(
            PoolConfig::default(),
            CountingDialer { dials: Arc::clone(&dials) },
        );
        pool.acquire("10.0.0.1:9000").await.unwrap();
        pool.acquire("10.0.0.2:9000").await.unwrap();
        assert_eq!(dials.load(Ordering::SeqCst), 2);
        assert_eq!(pool.len().await, 2);
    }

    #[tokio::test]
    async fn close_all_empties_the_map() {
        let dials = Arc::new(AtomicU32::new(0));
        let pool = ConnectionPool::new(
            PoolConfig::default(),
            CountingDialer { dials: Arc::clone(&dials) },
        );
        pool.acquire("10.0.0.1:9000").await.unwrap();
        pool.acquire("10.0.0.2:9000").await.unwrap();
        pool.close_all().await;
        assert_eq!(pool.len().await, 0);
    }

    #[tokio::test]
    async fn mark_failed_forces_redial_on_next_acquire() {
        let dials = Arc::new(AtomicU32::new(0));
        let pool = ConnectionPool::new(
            PoolConfig::default(),
            CountingDialer { dials: Arc::clone(&dials) },
        );
        pool.acquire("10.0.0.1:9000").await.unwrap();
        pool.mark_failed("10.0.0.1:9000").await;
        pool.acquire("10.0.0.1:9000").await.unwrap();
        assert_eq!(dials.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn run_sweep_loop_evicts_idle_entries_and_stops_on_cancellation() {
        let dials = Arc::new(AtomicU32::new(0));
        let pool = Arc::new(ConnectionPool::new(
            PoolConfig {
                max_idle: Duration::from_millis(20),
                sweep_interval: Duration::from_millis(10),
                ..PoolConfig::default()
            },
            CountingDialer { dials: Arc::clone(&dials) },
        ));
        pool.acquire("10.0.0.1:9000").await.unwrap();
        assert_eq!(dials.load(Ordering::SeqCst), 1);

        let token = CancellationToken::new();
        let loop_pool = Arc::clone(&pool);
        let loop_token = token.clone();
        let handle = tokio::spawn(async move { loop_pool.run_sweep_loop(loop_token).await });

        // Idle past max_idle; the background sweeper's own ticks (every
        // 10ms) eventually evict the entry without any `acquire` of this
        // address triggering it, so the next acquire redials.
        tokio::time::sleep(Duration::from_millis(60)).await;
        pool.acquire("10.0.0.1:9000").await.unwrap();
        assert_eq!(dials.load(Ordering::SeqCst), 2);

        token.cancel();
        handle.await.unwrap();
    }
}
