//! Hook domain model — see spec.md §3 "Hook"/"HookResult" and §4.8.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::EventType;

/// A user-defined reaction to events of a matching type and stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hook {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// `None` means this hook matches every event type (wildcard).
    pub event_type: Option<EventType>,
    /// Path to the executable script invoked on match.
    pub file_path: String,
    /// Scoping label; defaults to `"default"` when unset.
    pub stack: String,
    pub enabled: bool,
    pub run_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Hook {
    #[must_use]
    pub fn new(name: impl Into<String>, file_path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            event_type: None,
            file_path: file_path.into(),
            stack: "default".to_string(),
            enabled: true,
            run_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// True if this hook should run for the given event type and stack
    /// filter, per spec.md §4.8: `hook.event_type == event.type` (or hook is
    /// a wildcard) AND (`hook.stack == ""` OR the stack filter matches).
    #[must_use]
    pub fn matches(&self, event_type: &EventType, stack_filter: Option<&str>) -> bool {
        if !self.enabled {
            return false;
        }
        let type_matches = self
            .event_type
            .as_ref()
            .is_none_or(|hook_type| hook_type == event_type);
        let stack_matches = match stack_filter {
            None => true,
            Some(filter) => self.stack.is_empty() || self.stack == filter,
        };
        type_matches && stack_matches
    }
}

/// Append-only audit row recording one hook execution against one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookResult {
    pub hook_id: Uuid,
    pub event_id: Uuid,
    pub success: bool,
    pub duration: std::time::Duration,
    pub output: String,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate execution statistics computed on demand by scanning recent
/// `HookResult` rows (spec.md §4.8).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HookStats {
    pub total_runs: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub average_duration: std::time::Duration,
}

impl HookStats {
    #[must_use]
    pub fn from_results(results: &[HookResult]) -> Self {
        if results.is_empty() {
            return Self::default();
        }
        let success_count = results.iter().filter(|r| r.success).count() as u64;
        let total_nanos: u128 = results.iter().map(|r| r.duration.as_nanos()).sum();
        Self {
            total_runs: results.len() as u64,
            success_count,
            failure_count: results.len() as u64 - success_count,
            average_duration: std::time::Duration::from_nanos(
                (total_nanos / results.len() as u128) as u64,
            ),
        }
    }
}
