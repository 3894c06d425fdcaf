//! Agent group domain model — see spec.md §3 "Agent Group"/"Group
//! Hierarchy"/"Group Template"/"AutoDiscoveryConfig" and §4.9.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::agent::Agent;

/// A named, ordered subset of the fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentGroup {
    /// Id equals name; names are unique.
    pub id: String,
    pub description: String,
    pub tags: HashMap<String, String>,
    /// Ordered by name.
    pub agent_names: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentGroup {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: name.into(),
            description: String::new(),
            tags: HashMap::new(),
            agent_names: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_members_sorted(&mut self, mut names: Vec<String>) {
        names.sort();
        names.dedup();
        self.agent_names = names;
        self.updated_at = Utc::now();
    }
}

/// One node in the group parent/child hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupHierarchy {
    pub group_id: String,
    pub parent_id: Option<String>,
    pub level: u32,
    pub path: String,
}

impl GroupHierarchy {
    #[must_use]
    pub fn root(group_id: impl Into<String>) -> Self {
        let group_id = group_id.into();
        let path = format!("/{group_id}");
        Self {
            group_id,
            parent_id: None,
            level: 0,
            path,
        }
    }

    /// Compute the child node resulting from `SetParent(group, parent)`,
    /// per spec.md §4.9: `level = parent.level + 1`, `path = parent.path +
    /// "/" + group_id`.
    #[must_use]
    pub fn child_of(group_id: impl Into<String>, parent: &GroupHierarchy) -> Self {
        let group_id = group_id.into();
        Self {
            path: format!("{}/{}", parent.path, group_id),
            level: parent.level + 1,
            parent_id: Some(parent.group_id.clone()),
            group_id,
        }
    }
}

/// The comparison applied by a `GroupRule`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
    Equals,
    Contains,
    Regex,
}

/// The agent field (or field family) a `GroupRule` inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    TagMatch,
    NamePattern,
    Status,
}

/// One predicate in a template or auto-discovery config. `key` selects which
/// tag to inspect when `rule_type == TagMatch`; it is ignored otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRule {
    pub rule_type: RuleType,
    pub key: String,
    pub value: String,
    pub operator: RuleOperator,
}

impl GroupRule {
    /// Evaluate this rule against one agent's name/status/(absent tags —
    /// agents don't carry tags in this data model, so `TagMatch` rules are
    /// evaluated against the agent's cached `system_info` document under
    /// `key`, matching the teacher's convention of structured-document
    /// lookups for operator-style filters).
    pub fn matches(&self, agent: &Agent, now: DateTime<Utc>, staleness: chrono::Duration) -> DomainResult<bool> {
        let candidate = match self.rule_type {
            RuleType::NamePattern => agent.name.clone(),
            RuleType::Status => agent.effective_status(now, staleness).as_str().to_string(),
            RuleType::TagMatch => agent
                .system_info
                .as_ref()
                .and_then(|doc| doc.get(&self.key))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        };
        self.apply_operator(&candidate)
    }

    fn apply_operator(&self, candidate: &str) -> DomainResult<bool> {
        match self.operator {
            RuleOperator::Equals => Ok(candidate == self.value),
            RuleOperator::Contains => Ok(candidate.contains(&self.value)),
            RuleOperator::Regex => {
                let re = Regex::new(&self.value)
                    .map_err(|e| DomainError::Validation(format!("invalid regex '{}': {e}", self.value)))?;
                Ok(re.is_match(candidate))
            }
        }
    }
}

/// Select the subset of `agents` for which every rule in `rules` matches
/// (AND semantics), shared by `GroupTemplate::select_members` and
/// auto-discovery evaluation so both apply the same predicate.
pub fn select_by_rules<'a>(
    rules: &[GroupRule],
    agents: &'a [Agent],
    now: DateTime<Utc>,
    staleness: chrono::Duration,
) -> DomainResult<Vec<&'a Agent>> {
    let mut matched = Vec::new();
    for agent in agents {
        let mut all_match = true;
        for rule in rules {
            if !rule.matches(agent, now, staleness)? {
                all_match = false;
                break;
            }
        }
        if all_match {
            matched.push(agent);
        }
    }
    Ok(matched)
}

/// A rule set that, applied to a group name, selects matching agents (AND
/// semantics across all rules).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub tags: HashMap<String, String>,
    pub rules: Vec<GroupRule>,
}

impl GroupTemplate {
    /// Select the subset of `agents` for which every rule matches, per
    /// spec.md §4.9. Deterministic and order-stable: callers sort the
    /// result by name (enforced by `AgentGroup::set_members_sorted`).
    pub fn select_members<'a>(
        &self,
        agents: &'a [Agent],
        now: DateTime<Utc>,
        staleness: chrono::Duration,
    ) -> DomainResult<Vec<&'a Agent>> {
        select_by_rules(&self.rules, agents, now, staleness)
    }
}

/// A scheduled-or-manual rule-evaluation run that appends newly matching
/// agents to a target group. Never removes existing members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoDiscoveryConfig {
    pub id: Uuid,
    pub rules: Vec<GroupRule>,
    pub target_group: String,
    /// Interval between scheduled runs. See DESIGN.md for why this is a
    /// plain duration rather than a cron expression.
    pub schedule: std::time::Duration,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_with_tag(name: &str, key: &str, value: &str) -> Agent {
        let mut agent = Agent::register(name, "10.0.0.1:9000", "1.0.0");
        agent.system_info = Some(serde_json::json!({ key: value }));
        agent
    }

    #[test]
    fn hierarchy_child_computes_level_and_path() {
        let root = GroupHierarchy::root("infra");
        let child = GroupHierarchy::child_of("infra-db", &root);
        assert_eq!(child.level, 1);
        assert_eq!(child.path, "/infra/infra-db");
        assert_eq!(child.parent_id, Some("infra".to_string()));
    }

    #[test]
    fn template_applies_and_semantics_across_rules() {
        let agents = vec![
            agent_with_tag("a1", "region", "us-east"),
            agent_with_tag("a2", "region", "us-west"),
        ];
        let template = GroupTemplate {
            id: Uuid::new_v4(),
            name: "us-east-fleet".to_string(),
            description: String::new(),
            tags: HashMap::new(),
            rules: vec![GroupRule {
                rule_type: RuleType::TagMatch,
                key: "region".to_string(),
                value: "us-east".to_string(),
                operator: RuleOperator::Equals,
            }],
        };
        let matched = template
            .select_members(&agents, Utc::now(), chrono::Duration::minutes(5))
            .unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "a1");
    }

    #[test]
    fn template_selection_is_order_stable_when_sorted() {
        let agents = vec![
            agent_with_tag("zeta", "region", "us-east"),
            agent_with_tag("alpha", "region", "us-east"),
        ];
        let template = GroupTemplate {
            id: Uuid::new_v4(),
            name: "all".to_string(),
            description: String::new(),
            tags: HashMap::new(),
            rules: vec![GroupRule {
                rule_type: RuleType::TagMatch,
                key: "region".to_string(),
                value: "us-east".to_string(),
                operator: RuleOperator::Equals,
            }],
        };
        let mut names: Vec<String> = template
            .select_members(&agents, Utc::now(), chrono::Duration::minutes(5))
            .unwrap()
            .into_iter()
            .map(|a| a.name.clone())
            .collect();
        names.sort();
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[test]
    fn name_pattern_regex_operator_matches() {
        let agent = Agent::register("worker-07", "10.0.0.1:9000", "1.0.0");
        let rule = GroupRule {
            rule_type: RuleType::NamePattern,
            key: String::new(),
            value: "^worker-\\d+$".to_string(),
            operator: RuleOperator::Regex,
        };
        assert!(rule.matches(&agent, Utc::now(), chrono::Duration::minutes(5)).unwrap());
    }
}
