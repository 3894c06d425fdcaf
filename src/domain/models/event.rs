//! Event domain model — see spec.md §3 "Event" and §4.7.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Closed vocabulary of event types an agent or the master may emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    FileChange,
    ProcessUp,
    ProcessDown,
    CpuHigh,
    MemoryHigh,
    DiskHigh,
    PortOpen,
    PortClosed,
    ServiceEvent,
    Custom(String),
}

impl EventType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::FileChange => "file_change",
            Self::ProcessUp => "process_up",
            Self::ProcessDown => "process_down",
            Self::CpuHigh => "cpu_high",
            Self::MemoryHigh => "memory_high",
            Self::DiskHigh => "disk_high",
            Self::PortOpen => "port_open",
            Self::PortClosed => "port_closed",
            Self::ServiceEvent => "service_event",
            Self::Custom(s) => s.as_str(),
        }
    }

    #[must_use]
    pub fn parse_str(s: &str) -> Self {
        match s {
            "file_change" => Self::FileChange,
            "process_up" => Self::ProcessUp,
            "process_down" => Self::ProcessDown,
            "cpu_high" => Self::CpuHigh,
            "memory_high" => Self::MemoryHigh,
            "disk_high" => Self::DiskHigh,
            "port_open" => Self::PortOpen,
            "port_closed" => Self::PortClosed,
            "service_event" => Self::ServiceEvent,
            other => Self::Custom(other.to_string()),
        }
    }
}

/// Lifecycle status of an enqueued event. See spec.md §4.7 for the exact
/// transition rules enforced by the event queue service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl EventStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal statuses cannot be re-claimed by the dispatcher.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub event_type: EventType,
    /// Originating agent name, or empty string for master-origin events.
    pub agent: String,
    pub payload: JsonValue,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub retry_count: u32,
}

impl Event {
    #[must_use]
    pub fn new(event_type: EventType, agent: impl Into<String>, payload: JsonValue) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            event_type,
            agent: agent.into(),
            payload,
            status: EventStatus::Pending,
            created_at: now,
            updated_at: now,
            last_error: None,
            retry_count: 0,
        }
    }
}

/// Filters accepted by `ListEvents`.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<EventType>,
    pub status: Option<EventStatus>,
    pub limit: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_event_starts_pending_with_no_retries() {
        let event = Event::new(EventType::CpuHigh, "agent-a", serde_json::json!({"cpu": 91}));
        assert_eq!(event.status, EventStatus::Pending);
        assert_eq!(event.retry_count, 0);
        assert!(event.last_error.is_none());
    }

    #[test]
    fn custom_event_type_round_trips_through_str() {
        let parsed = EventType::parse_str("deploy_finished");
        assert_eq!(parsed.as_str(), "deploy_finished");
        assert!(matches!(parsed, EventType::Custom(_)));
    }

    #[test]
    fn terminal_statuses_are_completed_and_failed_only() {
        assert!(EventStatus::Completed.is_terminal());
        assert!(EventStatus::Failed.is_terminal());
        assert!(!EventStatus::Pending.is_terminal());
        assert!(!EventStatus::Processing.is_terminal());
    }
}
