//! Bulk operation domain model — see spec.md §3 "Bulk Operation / Result"
//! and §4.9.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkOperationKind {
    ExecuteCommand,
    Restart,
    Update,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOperation {
    pub group_id: String,
    pub operation: BulkOperationKind,
    pub params: JsonValue,
    pub timeout: Duration,
}

/// The outcome of invoking a bulk operation's RPC against one group member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkAgentResult {
    pub agent_name: String,
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
    pub duration: Duration,
}

/// Aggregate result of a bulk operation. Never carries a top-level error:
/// callers always get totals plus per-agent detail, per spec.md §7's "bulk
/// operations always 200-level aggregate" rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOperationResult {
    pub group_id: String,
    pub total_agents: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<BulkAgentResult>,
}

impl BulkOperationResult {
    #[must_use]
    pub fn from_results(group_id: impl Into<String>, results: Vec<BulkAgentResult>) -> Self {
        let success_count = results.iter().filter(|r| r.success).count();
        let total_agents = results.len();
        Self {
            group_id: group_id.into(),
            total_agents,
            success_count,
            failure_count: total_agents - success_count,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_counts_successes_and_failures() {
        let results = vec![
            BulkAgentResult {
                agent_name: "a1".to_string(),
                success: true,
                output: Some("ok".to_string()),
                error: None,
                duration: Duration::from_millis(5),
            },
            BulkAgentResult {
                agent_name: "a2".to_string(),
                success: false,
                output: None,
                error: Some("unreachable".to_string()),
                duration: Duration::from_millis(3),
            },
        ];
        let aggregate = BulkOperationResult::from_results("group-1", results);
        assert_eq!(aggregate.total_agents, 2);
        assert_eq!(aggregate.success_count, 1);
        assert_eq!(aggregate.failure_count, 1);
    }
}
