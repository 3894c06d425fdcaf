//! Cross-cutting reliability primitives — spec.md §4.1–§4.3.

pub mod circuit_breaker;
pub mod object_pool;
pub mod pool;
pub mod retrier;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerManager, CircuitState};
pub use object_pool::ObjectPool;
pub use pool::{ConnectionPool, Dialer, PoolConfig};
pub use retrier::{RetryConfig, RetryError, RetryExhaustedError, RetryStrategy};
