//! Domain models
//!
//! Pure domain entities for the fleet control plane. These models are
//! framework-agnostic and contain no persistence or transport concerns.

pub mod agent;
pub mod bulk;
pub mod event;
pub mod group;
pub mod hook;
pub mod metric;
pub mod webhook;

pub use agent::{Agent, AgentStatus};
pub use bulk::{BulkAgentResult, BulkOperation, BulkOperationKind, BulkOperationResult};
pub use event::{Event, EventFilter, EventStatus, EventType};
pub use group::{
    select_by_rules, AgentGroup, AutoDiscoveryConfig, GroupHierarchy, GroupRule, GroupTemplate,
    RuleOperator, RuleType,
};
pub use hook::{Hook, HookResult, HookStats};
pub use metric::{AgentMetric, MetricPoint};
pub use webhook::{Webhook, WebhookEvent, WebhookLog};
