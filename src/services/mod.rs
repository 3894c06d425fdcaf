//! Application services for the fleet control plane — spec.md §4. Each
//! module wraps one or more domain ports with the stateful behavior
//! (caching, batching, long-lived loops, retries) that the ports themselves
//! don't carry.

pub mod bulk_executor;
pub mod events;
pub mod group_orchestrator;
pub mod hook_dispatcher;
pub mod metrics_buffer;
pub mod metrics_collector;
pub mod registry;
pub mod telemetry_client;
pub mod watcher_facade;

pub use bulk_executor::{BulkAgentExecutor, GrpcBulkExecutor};
pub use events::EventService;
pub use group_orchestrator::GroupOrchestrator;
pub use hook_dispatcher::HookDispatcher;
pub use metrics_buffer::BufferedMetricsStore;
pub use metrics_collector::{AgentTelemetryClient, FleetListProvider, MetricsCollector};
pub use registry::RegistryService;
pub use telemetry_client::GrpcTelemetryClient;
pub use watcher_facade::WatcherFacade;
