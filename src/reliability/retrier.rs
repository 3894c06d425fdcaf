//! Retrier — spec.md §4.2.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::DomainError;

/// Backoff calculation strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryStrategy {
    Fixed,
    Exponential,
    Linear,
    Custom,
}

/// Wraps the last error on exhaustion together with attempt/elapsed
/// accounting, per spec.md §4.2.
#[derive(Debug, Error)]
#[error("retry exhausted after {attempts} attempts ({elapsed:?}): {source}")]
pub struct RetryExhaustedError<E> {
    pub attempts: u32,
    pub elapsed: Duration,
    pub source: E,
}

/// `execute`'s error type: either the predicate/attempt budget was exhausted
/// (carrying the last underlying error), or the caller's cancellation token
/// fired during back-off, per spec.md §8's "on context cancellation during
/// back-off, Execute returns a cancellation error".
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error(transparent)]
    Exhausted(RetryExhaustedError<E>),
    #[error("retry cancelled after {attempts} attempts ({elapsed:?})")]
    Cancelled { attempts: u32, elapsed: Duration },
}

/// Configuration for one retrier instance.
#[derive(Clone)]
pub struct RetryConfig<E> {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub strategy: RetryStrategy,
    pub multiplier: f64,
    pub jitter: bool,
    /// Default: retry everything except `DomainError::CircuitOpen`, mapped
    /// through `classify`.
    pub should_retry: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    pub on_retry: Option<Arc<dyn Fn(u32, Duration, &E) + Send + Sync>>,
    /// Required when `strategy == Custom`; ignored otherwise.
    pub custom_delay_fn: Option<Arc<dyn Fn(u32) -> Duration + Send + Sync>>,
}

impl<E> RetryConfig<E> {
    #[must_use]
    pub fn new(should_retry: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            strategy: RetryStrategy::Exponential,
            multiplier: 2.0,
            jitter: false,
            should_retry: Arc::new(should_retry),
            on_retry: None,
            custom_delay_fn: None,
        }
    }

    #[must_use]
    pub fn with_on_retry(mut self, f: impl Fn(u32, Duration, &E) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn with_custom_delay(mut self, f: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        self.strategy = RetryStrategy::Custom;
        self.custom_delay_fn = Some(Arc::new(f));
        self
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = match self.strategy {
            RetryStrategy::Fixed => self.initial_delay,
            RetryStrategy::Exponential => {
                let factor = self.multiplier.powi(i32::try_from(attempt - 1).unwrap_or(i32::MAX));
                self.initial_delay.mul_f64(factor)
            }
            RetryStrategy::Linear => self.initial_delay.mul_f64(f64::from(attempt) * self.multiplier),
            RetryStrategy::Custom => self
                .custom_delay_fn
                .as_ref()
                .map_or(self.initial_delay, |f| f(attempt)),
        };
        let capped = base.min(self.max_delay);
        if self.jitter {
            apply_jitter(capped)
        } else {
            capped
        }
    }
}

/// Default `should_retry` predicate for `DomainError`: retries everything
/// except `CircuitOpen`.
#[must_use]
pub fn default_domain_predicate(err: &DomainError) -> bool {
    err.is_retryable_by_default()
}

fn apply_jitter(d: Duration) -> Duration {
    // +-10% jitter. Deterministic-free: draws entropy from the wall clock's
    // sub-second nanoseconds rather than a seeded RNG, since this crate
    // takes no dependency on `rand`. Unlike `Instant::now().elapsed()`
    // (which measures the gap to its own immediate call and is therefore
    // always a handful of nanoseconds), wall-clock nanos vary widely call
    // to call and spread roughly uniformly across the jitter range.
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.subsec_nanos());
    let spread = f64::from(nanos % 2000) / 1000.0 - 1.0; // in [-1.0, 1.0)
    let factor = 1.0 + spread * 0.10;
    d.mul_f64(factor.max(0.0))
}

/// Execute `operation` under `config`, sleeping between attempts per the
/// configured strategy. `cancellation` is checked before each sleep and
/// during it; cancellation during back-off returns `RetryError::Cancelled`
/// immediately rather than running another attempt.
pub async fn execute<F, Fut, T, E>(
    config: &RetryConfig<E>,
    cancellation: &CancellationToken,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let result = operation().await;
        match result {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retryable = (config.should_retry)(&err);
                if !retryable || attempt >= config.max_attempts {
                    return Err(RetryError::Exhausted(RetryExhaustedError {
                        attempts: attempt,
                        elapsed: started.elapsed(),
                        source: err,
                    }));
                }

                let delay = config.delay_for_attempt(attempt);
                if let Some(on_retry) = &config.on_retry {
                    on_retry(attempt, delay, &err);
                }

                tokio::select! {
                    () = sleep(delay) => {}
                    () = cancellation.cancelled() => {
                        return Err(RetryError::Cancelled {
                            attempts: attempt,
                            elapsed: started.elapsed(),
                        });
                    }
                }
            }
        }
    }
}
