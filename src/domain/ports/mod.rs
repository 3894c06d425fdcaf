//! Domain ports (repository/store interfaces) for the fleet control plane.

pub mod agent_repository;
pub mod event_queue;
pub mod group_repository;
pub mod hook_repository;
pub mod metrics_store;
pub mod webhook_repository;

pub use agent_repository::AgentRepository;
pub use event_queue::EventQueue;
pub use group_repository::GroupRepository;
pub use hook_repository::HookRepository;
pub use metrics_store::MetricsStore;
pub use webhook_repository::WebhookRepository;
