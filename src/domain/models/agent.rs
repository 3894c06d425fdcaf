//! Agent domain model.
//!
//! An Agent is a worker process on a remote host, identified by a unique
//! name, that reports liveness via heartbeat and periodically has its
//! system info refreshed by the [`crate::services::registry`] subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Liveness status of an agent as observed by the registry.
///
/// `Active`/`Disconnected` are derived at read time from `last_heartbeat`
/// versus a staleness threshold (see [`AgentStatus::derive`]); `Unknown`
/// covers agents that registered but have never heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Disconnected,
    Unknown,
}

impl AgentStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Disconnected => "disconnected",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "disconnected" => Some(Self::Disconnected),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Derive the UI-facing status from the last heartbeat and a staleness
    /// threshold, per spec.md §4.4: an agent with no heartbeat at all is
    /// `Unknown`; one heartbeating within the threshold is `Active`; older
    /// than that is `Disconnected`.
    #[must_use]
    pub fn derive(last_heartbeat: Option<DateTime<Utc>>, now: DateTime<Utc>, staleness: chrono::Duration) -> Self {
        match last_heartbeat {
            None => Self::Unknown,
            Some(hb) if now - hb <= staleness => Self::Active,
            Some(_) => Self::Disconnected,
        }
    }
}

/// A registered fleet member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique, user-facing identifier. Stable across re-registrations.
    pub name: String,
    /// Network address, "host:port". May change across registrations.
    pub address: String,
    /// Status as of the last time it was computed (for callers that want a
    /// stored snapshot); prefer `AgentStatus::derive` for an always-fresh
    /// view using `last_heartbeat`.
    pub status: AgentStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_info_collected: Option<DateTime<Utc>>,
    /// Opaque structured document describing host OS/hardware, cached from
    /// the agent's own report.
    pub system_info: Option<JsonValue>,
    pub agent_version: String,
}

impl Agent {
    /// Construct a freshly registered agent: status active, heartbeat now.
    #[must_use]
    pub fn register(name: impl Into<String>, address: impl Into<String>, agent_version: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            address: address.into(),
            status: AgentStatus::Active,
            last_heartbeat: Some(now),
            registered_at: now,
            updated_at: now,
            last_info_collected: None,
            system_info: None,
            agent_version: agent_version.into(),
        }
    }

    #[must_use]
    pub fn effective_status(&self, now: DateTime<Utc>, staleness: chrono::Duration) -> AgentStatus {
        AgentStatus::derive(self.last_heartbeat, now, staleness)
    }
}
