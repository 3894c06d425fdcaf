//! Layered configuration loading and validation — spec.md §4's numeric
//! knobs, collected into one `FleetConfig` and loaded the way the teacher's
//! `infrastructure::config::loader` loads its own: compiled-in defaults,
//! merged with an optional `fleetd.yaml`, merged with an optional
//! `fleetd.local.yaml`, merged with `FLEETD_`-prefixed environment
//! variables (double underscore for nesting).
//!
//! Durations are expressed as plain integer fields (`_secs`/`_ms` suffixed)
//! rather than `std::time::Duration` directly, since `Duration` has no
//! `Deserialize` impl that reads plain YAML/env scalars; each subsystem
//! config exposes a `to_*_config()` conversion into the `reliability` and
//! `services` types that do want `Duration`.

use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::logging::LogConfig;
use crate::reliability::circuit_breaker::CircuitBreakerConfig;
use crate::reliability::pool::PoolConfig;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] figment::Error),

    #[error("unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("invalid database path: must not be empty")]
    EmptyDatabasePath,

    #[error("invalid {field}: {value} is outside the allowed range ({reason})")]
    OutOfRange {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Top-level configuration for the `fleetd` daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FleetConfig {
    pub database: DatabaseConfig,
    pub grpc: GrpcConfig,
    pub registry: RegistryConfig,
    pub metrics_store: MetricsStoreConfig,
    pub metrics_collector: MetricsCollectorConfig,
    pub event_queue: EventQueueConfig,
    pub hook_dispatcher: HookDispatcherConfig,
    pub group_orchestrator: GroupOrchestratorConfig,
    pub connection_pool: ConnectionPoolConfig,
    pub circuit_breaker: CircuitBreakerSettings,
    pub retrier: RetrierConfig,
    pub logging: LogConfig,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            grpc: GrpcConfig::default(),
            registry: RegistryConfig::default(),
            metrics_store: MetricsStoreConfig::default(),
            metrics_collector: MetricsCollectorConfig::default(),
            event_queue: EventQueueConfig::default(),
            hook_dispatcher: HookDispatcherConfig::default(),
            group_orchestrator: GroupOrchestratorConfig::default(),
            connection_pool: ConnectionPoolConfig::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            retrier: RetrierConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DatabaseConfig {
    /// `sqlx` connection URL, e.g. `sqlite://fleetd.db`.
    pub path: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "sqlite://fleetd.db".to_string(),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout_secs: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GrpcConfig {
    /// Address the `FleetService` server binds to.
    pub bind_address: String,
    pub max_message_bytes: usize,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7443".to_string(),
            max_message_bytes: 1024 * 1024,
        }
    }
}

/// spec.md §4.4 — registry staleness window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RegistryConfig {
    pub staleness_threshold_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            staleness_threshold_secs: 5 * 60,
        }
    }
}

impl RegistryConfig {
    #[must_use]
    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_secs(self.staleness_threshold_secs)
    }
}

/// spec.md §4.5 — batched metric ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MetricsStoreConfig {
    pub batch_size: usize,
    pub flush_interval_secs: u64,
    pub retention_days: i64,
    pub cleanup_period_secs: u64,
}

impl Default for MetricsStoreConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            flush_interval_secs: 5,
            retention_days: 7,
            cleanup_period_secs: 60 * 60,
        }
    }
}

impl MetricsStoreConfig {
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    #[must_use]
    pub fn cleanup_period(&self) -> Duration {
        Duration::from_secs(self.cleanup_period_secs)
    }
}

/// spec.md §4.6 — polling collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MetricsCollectorConfig {
    pub interval_secs: u64,
    pub per_agent_timeout_secs: u64,
    pub batch_concurrency: usize,
}

impl Default for MetricsCollectorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            per_agent_timeout_secs: 3,
            batch_concurrency: 5,
        }
    }
}

impl MetricsCollectorConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    #[must_use]
    pub fn per_agent_timeout(&self) -> Duration {
        Duration::from_secs(self.per_agent_timeout_secs)
    }
}

/// spec.md §4.7 — stuck-event recovery window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EventQueueConfig {
    pub recovery_timeout_secs: u64,
    pub dispatch_concurrency: usize,
}

impl Default for EventQueueConfig {
    fn default() -> Self {
        Self {
            recovery_timeout_secs: 10 * 60,
            dispatch_concurrency: 4,
        }
    }
}

impl EventQueueConfig {
    #[must_use]
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

/// spec.md §4.8 — hook execution timeout plus dispatch-loop batching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HookDispatcherConfig {
    pub execution_timeout_secs: u64,
    pub batch_size: i64,
    pub tick_secs: u64,
    /// `None` matches hooks regardless of stack; set to scope a single
    /// daemon instance to one deployment stack.
    pub stack_filter: Option<String>,
}

impl Default for HookDispatcherConfig {
    fn default() -> Self {
        Self {
            execution_timeout_secs: 30,
            batch_size: 20,
            tick_secs: 2,
            stack_filter: None,
        }
    }
}

impl HookDispatcherConfig {
    #[must_use]
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }
}

/// spec.md §4.9 — group mutation bulk-op and webhook fan-out bounds, plus
/// the auto-discovery scheduler tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GroupOrchestratorConfig {
    pub bulk_operation_concurrency: usize,
    pub webhook_delivery_timeout_secs: u64,
    pub auto_discovery_tick_secs: u64,
}

impl Default for GroupOrchestratorConfig {
    fn default() -> Self {
        Self {
            bulk_operation_concurrency: 10,
            webhook_delivery_timeout_secs: 10,
            auto_discovery_tick_secs: 30,
        }
    }
}

impl GroupOrchestratorConfig {
    #[must_use]
    pub fn webhook_delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_delivery_timeout_secs)
    }

    #[must_use]
    pub fn auto_discovery_tick(&self) -> Duration {
        Duration::from_secs(self.auto_discovery_tick_secs)
    }
}

/// spec.md §4.3.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ConnectionPoolConfig {
    pub max_idle_secs: u64,
    pub max_age_secs: u64,
    pub dial_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub max_message_bytes: usize,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_idle_secs: 30 * 60,
            max_age_secs: 2 * 60 * 60,
            dial_timeout_secs: 5,
            sweep_interval_secs: 5 * 60,
            max_message_bytes: 1024 * 1024,
        }
    }
}

impl ConnectionPoolConfig {
    #[must_use]
    pub fn to_pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_idle: Duration::from_secs(self.max_idle_secs),
            max_age: Duration::from_secs(self.max_age_secs),
            dial_timeout: Duration::from_secs(self.dial_timeout_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            max_message_bytes: self.max_message_bytes,
        }
    }
}

/// spec.md §4.1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CircuitBreakerSettings {
    pub max_failures: u32,
    pub open_timeout_secs: u64,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            max_failures: 5,
            open_timeout_secs: 30,
            success_threshold: 1,
        }
    }
}

impl CircuitBreakerSettings {
    #[must_use]
    pub fn to_circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            max_failures: self.max_failures,
            open_timeout: Duration::from_secs(self.open_timeout_secs),
            success_threshold: self.success_threshold,
        }
    }
}

/// spec.md §4.2. `should_retry`/`on_retry`/`custom_delay_fn` are per-call
/// behavior, not configuration, so only the numeric shape lives here; the
/// call site builds a `RetryConfig<E>` from these fields plus its own
/// predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetrierConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_secs: u64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetrierConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_secs: 30,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetrierConfig {
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }
}

impl FleetConfig {
    /// Load layered configuration: defaults, `fleetd.yaml`, `fleetd.local.yaml`,
    /// `FLEETD_`-prefixed environment variables. Returns a validated config.
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Yaml::file("fleetd.yaml"))
            .merge(Yaml::file("fleetd.local.yaml"))
            .merge(Env::prefixed("FLEETD_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit file path instead of the default `fleetd.yaml`
    /// search, used by tests and by an operator pointing at an alternate
    /// config file.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("FLEETD_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every numeric knob against a sane range. `deny_unknown_fields`
    /// on every nested struct already rejects unknown keys at parse time;
    /// this pass catches values that parse fine but make no operational
    /// sense (zero batch sizes, zero timeouts, inverted backoff bounds).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if self.database.max_connections == 0 {
            return Err(out_of_range("database.max_connections", "0", "must be >= 1"));
        }
        if self.registry.staleness_threshold_secs == 0 {
            return Err(out_of_range(
                "registry.staleness_threshold_secs",
                "0",
                "must be >= 1",
            ));
        }
        if self.metrics_store.batch_size == 0 {
            return Err(out_of_range("metrics_store.batch_size", "0", "must be >= 1"));
        }
        if self.metrics_store.flush_interval_secs == 0 {
            return Err(out_of_range(
                "metrics_store.flush_interval_secs",
                "0",
                "must be >= 1",
            ));
        }
        if self.metrics_collector.interval_secs == 0 {
            return Err(out_of_range(
                "metrics_collector.interval_secs",
                "0",
                "must be >= 1",
            ));
        }
        if self.metrics_collector.batch_concurrency == 0 {
            return Err(out_of_range(
                "metrics_collector.batch_concurrency",
                "0",
                "must be >= 1",
            ));
        }
        if self.event_queue.recovery_timeout_secs == 0 {
            return Err(out_of_range(
                "event_queue.recovery_timeout_secs",
                "0",
                "must be >= 1",
            ));
        }
        if self.hook_dispatcher.execution_timeout_secs == 0 {
            return Err(out_of_range(
                "hook_dispatcher.execution_timeout_secs",
                "0",
                "must be >= 1",
            ));
        }
        if self.hook_dispatcher.batch_size == 0 {
            return Err(out_of_range("hook_dispatcher.batch_size", "0", "must be >= 1"));
        }
        if self.hook_dispatcher.tick_secs == 0 {
            return Err(out_of_range("hook_dispatcher.tick_secs", "0", "must be >= 1"));
        }
        if self.group_orchestrator.bulk_operation_concurrency == 0 {
            return Err(out_of_range(
                "group_orchestrator.bulk_operation_concurrency",
                "0",
                "must be >= 1",
            ));
        }
        if self.connection_pool.dial_timeout_secs == 0 {
            return Err(out_of_range(
                "connection_pool.dial_timeout_secs",
                "0",
                "must be >= 1",
            ));
        }
        if self.connection_pool.max_message_bytes == 0 {
            return Err(out_of_range(
                "connection_pool.max_message_bytes",
                "0",
                "must be >= 1",
            ));
        }
        if self.circuit_breaker.max_failures == 0 {
            return Err(out_of_range("circuit_breaker.max_failures", "0", "must be >= 1"));
        }
        if self.circuit_breaker.success_threshold == 0 {
            return Err(out_of_range(
                "circuit_breaker.success_threshold",
                "0",
                "must be >= 1",
            ));
        }
        if self.retrier.max_attempts == 0 {
            return Err(out_of_range("retrier.max_attempts", "0", "must be >= 1"));
        }
        if self.retrier.initial_delay() > self.retrier.max_delay() {
            return Err(ConfigError::OutOfRange {
                field: "retrier.initial_delay_ms",
                value: format!("{}ms", self.retrier.initial_delay_ms),
                reason: "must not exceed retrier.max_delay_secs",
            });
        }
        if self.retrier.multiplier <= 0.0 {
            return Err(out_of_range(
                "retrier.multiplier",
                &self.retrier.multiplier.to_string(),
                "must be > 0",
            ));
        }
        Ok(())
    }
}

fn out_of_range(field: &'static str, value: &str, reason: &'static str) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        value: value.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(FleetConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_database_path_rejected() {
        let mut config = FleetConfig::default();
        config.database.path = "   ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyDatabasePath)));
    }

    #[test]
    fn zero_batch_size_rejected() {
        let mut config = FleetConfig::default();
        config.metrics_store.batch_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::OutOfRange { field: "metrics_store.batch_size", .. })));
    }

    #[test]
    fn inverted_retry_backoff_rejected() {
        let mut config = FleetConfig::default();
        config.retrier.initial_delay_ms = 60_000;
        config.retrier.max_delay_secs = 1;
        assert!(matches!(config.validate(), Err(ConfigError::OutOfRange { field: "retrier.initial_delay_ms", .. })));
    }

    #[test]
    fn yaml_merge_overrides_defaults() {
        let yaml = r#"
database:
  path: "sqlite:///tmp/fleetd-test.db"
  max_connections: 8
  min_connections: 1
  acquire_timeout_secs: 3
metrics_collector:
  interval_secs: 15
  per_agent_timeout_secs: 2
  batch_concurrency: 8
"#;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fleetd.yaml");
        std::fs::write(&path, yaml).expect("write fixture");

        let config = FleetConfig::load_from_file(&path).expect("load");
        assert_eq!(config.database.path, "sqlite:///tmp/fleetd-test.db");
        assert_eq!(config.database.max_connections, 8);
        assert_eq!(config.metrics_collector.interval_secs, 15);
        // untouched sections keep their compiled-in defaults
        assert_eq!(config.registry.staleness_threshold_secs, 5 * 60);
    }

    #[test]
    fn unknown_top_level_key_rejected() {
        let yaml = "not_a_real_section:\n  foo: 1\n";
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fleetd.yaml");
        std::fs::write(&path, yaml).expect("write fixture");

        let result = FleetConfig::load_from_file(&path);
        assert!(result.is_err());
    }
}
