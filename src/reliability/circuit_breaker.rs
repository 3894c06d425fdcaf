//! Circuit breaker — spec.md §4.1.
//!
//! States `closed -> open -> half_open -> closed`, keyed by a plain string
//! name under a manager that lazily creates circuits on first use.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::errors::DomainError;

/// The three circuit states of spec.md §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub max_failures: u32,
    pub open_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            open_timeout: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

/// Monotonic counters plus last-success/last-failure timestamps.
#[derive(Debug, Clone, Default)]
pub struct CircuitStats {
    pub total_successes: u64,
    pub total_failures: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
}

struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<DateTime<Utc>>,
    stats: CircuitStats,
}

impl CircuitInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: None,
            stats: CircuitStats::default(),
        }
    }
}

/// A single named circuit.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: RwLock<CircuitInner>,
    total_rejections: AtomicU64,
}

impl CircuitBreaker {
    fn new(name: String, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: RwLock::new(CircuitInner::new()),
            total_rejections: AtomicU64::new(0),
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    pub async fn stats(&self) -> CircuitStats {
        self.inner.read().await.stats.clone()
    }

    /// Whether a call is currently allowed without transitioning state
    /// (pure read, used by callers that only want to report status).
    pub async fn allows(&self) -> bool {
        let inner = self.inner.read().await;
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => inner
                .opened_at
                .is_some_and(|opened| Utc::now() - opened >= chrono_duration(self.config.open_timeout)),
        }
    }

    async fn record_success(&self) {
        let mut inner = self.inner.write().await;
        inner.stats.total_successes += 1;
        inner.stats.last_success = Some(Utc::now());
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    async fn record_failure(&self) {
        let mut inner = self.inner.write().await;
        inner.stats.total_failures += 1;
        inner.stats.last_failure = Some(Utc::now());
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.max_failures {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Utc::now());
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Utc::now());
                inner.consecutive_successes = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Transition `open -> half_open` if the timeout has elapsed since
    /// opening. Returns the (possibly updated) state.
    async fn maybe_half_open(&self) -> CircuitState {
        let mut inner = self.inner.write().await;
        if inner.state == CircuitState::Open {
            if let Some(opened) = inner.opened_at {
                if Utc::now() - opened >= chrono_duration(self.config.open_timeout) {
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                }
            }
        }
        inner.state
    }

    fn reject_error(&self, opened_at: DateTime<Utc>) -> DomainError {
        self.total_rejections.fetch_add(1, Ordering::Relaxed);
        DomainError::CircuitOpen {
            name: self.name.clone(),
            opened_at_unix: opened_at.timestamp(),
            retry_after: self.config.open_timeout,
        }
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero())
}

/// Run `f` through the named circuit, tracking success/failure and
/// rejecting with `DomainError::CircuitOpen` when open.
///
/// `E` must convert `From<DomainError>` so a rejection can be represented
/// in the caller's own error type, mirroring the teacher's
/// `with_circuit_breaker` free function.
pub async fn execute<F, Fut, T, E>(breaker: &CircuitBreaker, f: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<DomainError>,
{
    let state = breaker.maybe_half_open().await;
    if state == CircuitState::Open {
        let opened_at = breaker.inner.read().await.opened_at.unwrap_or_else(Utc::now);
        return Err(breaker.reject_error(opened_at).into());
    }

    match f().await {
        Ok(value) => {
            breaker.record_success().await;
            Ok(value)
        }
        Err(err) => {
            breaker.record_failure().await;
            Err(err)
        }
    }
}

/// Manager keyed by string name, get-or-create under a read/write lock with
/// double-check on the write path.
pub struct CircuitBreakerManager {
    config: CircuitBreakerConfig,
    circuits: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerManager {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuits: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.circuits.read().await.get(name) {
            return Arc::clone(existing);
        }
        let mut circuits = self.circuits.write().await;
        if let Some(existing) = circuits.get(name) {
            return Arc::clone(existing);
        }
        let breaker = Arc::new(CircuitBreaker::new(name.to_string(), self.config.clone()));
        circuits.insert(name.to_string(), Arc::clone(&breaker));
        breaker
    }

    pub async fn get_state(&self, name: &str) -> Option<CircuitState> {
        match self.circuits.read().await.get(name) {
            Some(breaker) => Some(breaker.state().await),
            None => None,
        }
    }

    pub async fn reset(&self, name: &str) {
        if let Some(breaker) = self.circuits.read().await.get(name) {
            let mut inner = breaker.inner.write().await;
            *inner = CircuitInner::new();
        }
    }
}
