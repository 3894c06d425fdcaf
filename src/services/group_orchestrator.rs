//! Agent-group orchestrator — spec.md §4.9: group CRUD, hierarchy, templates,
//! auto-discovery, bulk operations and webhook notification all live here
//! since they share the same `GroupRepository` and compose the same bulk
//! executor and webhook client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::adapters::webhook::client::WebhookClient;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    select_by_rules, Agent, AgentGroup, AutoDiscoveryConfig, BulkAgentResult, BulkOperation,
    BulkOperationResult, GroupHierarchy, GroupTemplate, WebhookEvent, WebhookLog,
};
use crate::domain::ports::{AgentRepository, GroupRepository, WebhookRepository};
use crate::reliability::retrier::{self, RetryConfig};
use crate::services::bulk_executor::BulkAgentExecutor;

pub struct GroupOrchestrator<E: BulkAgentExecutor> {
    groups: Arc<dyn GroupRepository>,
    agents: Arc<dyn AgentRepository>,
    webhooks: Arc<dyn WebhookRepository>,
    executor: Arc<E>,
    webhook_client: Arc<WebhookClient>,
    staleness: chrono::Duration,
    bulk_concurrency: usize,
}

impl<E: BulkAgentExecutor + 'static> GroupOrchestrator<E> {
    #[must_use]
    pub fn new(
        groups: Arc<dyn GroupRepository>,
        agents: Arc<dyn AgentRepository>,
        webhooks: Arc<dyn WebhookRepository>,
        executor: Arc<E>,
        staleness: chrono::Duration,
        bulk_concurrency: usize,
    ) -> Self {
        Self {
            groups,
            agents,
            webhooks,
            executor,
            webhook_client: Arc::new(WebhookClient::new()),
            staleness,
            bulk_concurrency,
        }
    }

    // --- CRUD -----------------------------------------------------------

    pub async fn create_group(&self, group: &AgentGroup) -> DomainResult<()> {
        self.groups.create(group).await?;
        self.groups.set_parent(&GroupHierarchy::root(&group.id)).await?;
        self.emit_webhook(WebhookEvent::GroupCreated, &group.id, group).await;
        Ok(())
    }

    pub async fn get_group(&self, id: &str) -> DomainResult<AgentGroup> {
        self.groups.get(id).await
    }

    pub async fn list_groups(&self) -> DomainResult<Vec<AgentGroup>> {
        self.groups.list().await
    }

    pub async fn update_group(&self, group: &AgentGroup) -> DomainResult<()> {
        self.groups.update(group).await?;
        self.emit_webhook(WebhookEvent::GroupUpdated, &group.id, group).await;
        Ok(())
    }

    /// Deletes a group, re-parenting its direct children to its own parent
    /// (or promoting them to root if it had none) before removing the
    /// hierarchy node itself. See DESIGN.md for why re-parenting beats the
    /// alternative of cascading the delete to descendants.
    pub async fn delete_group(&self, id: &str) -> DomainResult<()> {
        let node = self.groups.get_hierarchy(id).await?;
        let children = self.groups.hierarchy_children(id).await?;

        for child in children {
            let new_node = match node.as_ref().and_then(|n| n.parent_id.clone()) {
                Some(ref grandparent) => {
                    let grandparent_node = self
                        .groups
                        .get_hierarchy(grandparent)
                        .await?
                        .ok_or_else(|| DomainError::Fatal(format!("missing hierarchy row for '{grandparent}'")))?;
                    GroupHierarchy::child_of(child.group_id.clone(), &grandparent_node)
                }
                None => GroupHierarchy::root(child.group_id.clone()),
            };
            self.groups.set_parent(&new_node).await?;
        }

        self.groups.delete_hierarchy_node(id).await?;
        self.groups.delete(id).await?;
        self.emit_webhook(WebhookEvent::GroupDeleted, id, &serde_json::json!({"group_id": id})).await;
        Ok(())
    }

    // --- Membership -------------------------------------------------------

    pub async fn set_members(&self, group_id: &str, mut agent_names: Vec<String>) -> DomainResult<()> {
        let mut group = self.groups.get(group_id).await?;
        agent_names.sort();
        agent_names.dedup();
        group.agent_names = agent_names;
        group.updated_at = Utc::now();
        self.groups.update(&group).await
    }

    // --- Hierarchy --------------------------------------------------------

    /// Sets `group_id`'s parent to `parent_id`, rejecting self-parenting and
    /// any assignment that would create a cycle (i.e. `group_id` already
    /// appears among `parent_id`'s ancestors).
    pub async fn set_parent(&self, group_id: &str, parent_id: &str) -> DomainResult<()> {
        if group_id == parent_id {
            return Err(DomainError::Validation(format!("group '{group_id}' cannot be its own parent")));
        }

        let ancestors = self.groups.hierarchy_chain(parent_id).await?;
        if ancestors.iter().any(|node| node.group_id == group_id) {
            return Err(DomainError::Validation(format!(
                "setting '{parent_id}' as parent of '{group_id}' would create a cycle"
            )));
        }

        let parent_node = self
            .groups
            .get_hierarchy(parent_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("group hierarchy '{parent_id}'")))?;
        let new_node = GroupHierarchy::child_of(group_id.to_string(), &parent_node);
        self.groups.set_parent(&new_node).await
    }

    pub async fn get_hierarchy(&self, group_id: &str) -> DomainResult<Option<GroupHierarchy>> {
        self.groups.get_hierarchy(group_id).await
    }

    // --- Templates ----------------------------------------------------------

    pub async fn create_template(&self, template: &GroupTemplate) -> DomainResult<()> {
        self.groups.create_template(template).await
    }

    pub async fn list_templates(&self) -> DomainResult<Vec<GroupTemplate>> {
        self.groups.list_templates().await
    }

    pub async fn delete_template(&self, id: Uuid) -> DomainResult<()> {
        self.groups.delete_template(id).await
    }

    /// Applies `template` to produce (or refresh) the group named
    /// `group_name`: members are the current agents matching every template
    /// rule, and tags are `template.tags` overridden per-key by `extra_tags`
    /// (caller-provided tags win — see DESIGN.md).
    pub async fn apply_template(
        &self,
        group_name: &str,
        template_id: Uuid,
        extra_tags: HashMap<String, String>,
    ) -> DomainResult<AgentGroup> {
        let template = self.groups.get_template(template_id).await?;
        let agents = self.agents.list().await?;
        let now = Utc::now();
        let mut names: Vec<String> = template
            .select_members(&agents, now, self.staleness)?
            .into_iter()
            .map(|a| a.name.clone())
            .collect();
        names.sort();
        names.dedup();

        let mut tags = template.tags.clone();
        tags.extend(extra_tags);

        let mut group = match self.groups.get(group_name).await {
            Ok(existing) => existing,
            Err(DomainError::NotFound(_)) => AgentGroup::new(group_name),
            Err(other) => return Err(other),
        };
        group.description = template.description.clone();
        group.tags = tags;
        group.set_members_sorted(names);

        if self.groups.get(group_name).await.is_ok() {
            self.update_group(&group).await?;
        } else {
            self.create_group(&group).await?;
        }
        Ok(group)
    }

    // --- Auto-discovery -----------------------------------------------------

    pub async fn create_auto_discovery(&self, config: &AutoDiscoveryConfig) -> DomainResult<()> {
        self.groups.create_auto_discovery(config).await
    }

    pub async fn list_auto_discovery(&self) -> DomainResult<Vec<AutoDiscoveryConfig>> {
        self.groups.list_auto_discovery().await
    }

    /// Evaluates every enabled `AutoDiscoveryConfig`, appending newly
    /// matching agents to each target group (never removing existing
    /// members), and stamps `last_run`. Run on a fixed interval by
    /// `run_auto_discovery_loop`.
    pub async fn run_auto_discovery(&self) -> DomainResult<()> {
        let configs = self.groups.list_auto_discovery().await?;
        let agents = self.agents.list().await?;
        let now = Utc::now();

        for config in configs.into_iter().filter(|c| c.enabled) {
            self.apply_auto_discovery(&config, &agents, now).await?;
        }
        Ok(())
    }

    async fn apply_auto_discovery(&self, config: &AutoDiscoveryConfig, agents: &[Agent], now: chrono::DateTime<Utc>) -> DomainResult<()> {
        let matched = select_by_rules(&config.rules, agents, now, self.staleness)?;
        let matched_names: Vec<String> = matched.into_iter().map(|a| a.name.clone()).collect();

        let mut group = match self.groups.get(&config.target_group).await {
            Ok(existing) => existing,
            Err(DomainError::NotFound(_)) => AgentGroup::new(&config.target_group),
            Err(other) => return Err(other),
        };

        let mut names: std::collections::BTreeSet<String> = group.agent_names.iter().cloned().collect();
        let before = names.len();
        names.extend(matched_names);
        let grew = names.len() > before;

        if grew || self.groups.get(&config.target_group).await.is_err() {
            group.set_members_sorted(names.into_iter().collect());
            if self.groups.get(&config.target_group).await.is_ok() {
                self.update_group(&group).await?;
            } else {
                self.create_group(&group).await?;
            }
        }

        self.groups.update_auto_discovery_last_run(config.id, now).await
    }

    /// Runs `run_auto_discovery` on a fixed tick until `token` is cancelled.
    pub async fn run_auto_discovery_loop(&self, tick: Duration, token: CancellationToken) {
        let mut ticker = tokio::time::interval(tick);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.run_auto_discovery().await {
                        tracing::error!(error = %err, "auto-discovery sweep failed");
                    }
                }
                () = token.cancelled() => break,
            }
        }
    }

    // --- Bulk operations ------------------------------------------------

    /// Executes `operation` against every member of `operation.group_id`
    /// with bounded concurrency, never failing the aggregate even if every
    /// member fails — per-agent outcomes carry their own error. `token`
    /// carries the caller's cancellation context: per spec.md §4.9/§5,
    /// cancelling it must terminate every outstanding per-agent task
    /// rather than leaving them to finish detached in the background.
    pub async fn execute_bulk(
        &self,
        operation: BulkOperation,
        token: &CancellationToken,
    ) -> DomainResult<BulkOperationResult> {
        let group = self.groups.get(&operation.group_id).await?;
        let semaphore = Arc::new(Semaphore::new(self.bulk_concurrency.max(1)));

        let mut tasks = Vec::with_capacity(group.agent_names.len());
        for name in &group.agent_names {
            let name = name.clone();
            let agents = Arc::clone(&self.agents);
            let executor = Arc::clone(&self.executor);
            let semaphore = Arc::clone(&semaphore);
            let kind = operation.operation;
            let params = operation.params.clone();
            let timeout = operation.timeout;
            let task_token = token.clone();

            tasks.push(tokio::spawn(async move {
                tokio::select! {
                    permit = semaphore.acquire_owned() => {
                        let _permit = permit.expect("semaphore never closed");
                        tokio::select! {
                            result = run_one(agents.as_ref(), executor.as_ref(), &name, kind, &params, timeout) => Some(result),
                            () = task_token.cancelled() => None,
                        }
                    }
                    () = task_token.cancelled() => None,
                }
            }));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(join_err) => results.push(BulkAgentResult {
                    agent_name: "unknown".to_string(),
                    success: false,
                    output: None,
                    error: Some(format!("task panicked: {join_err}")),
                    duration: Duration::ZERO,
                }),
            }
        }

        Ok(BulkOperationResult::from_results(operation.group_id, results))
    }

    // --- Webhooks --------------------------------------------------------

    /// Fire-and-forget webhook emission: looks up active subscribers for
    /// `event` and spawns one delivery-with-retry task per webhook so the
    /// caller's mutation (group create/update/delete) never blocks on
    /// external HTTP.
    async fn emit_webhook<T: serde::Serialize>(&self, event: WebhookEvent, group_id: &str, payload: &T) {
        let subscribers = match self.webhooks.list_active_for_event(event).await {
            Ok(subs) => subs,
            Err(err) => {
                tracing::error!(error = %err, "failed to list webhook subscribers");
                return;
            }
        };
        let Ok(body) = serde_json::to_value(payload) else {
            tracing::error!("failed to serialize webhook payload");
            return;
        };

        for webhook in subscribers {
            let client = Arc::clone(&self.webhook_client);
            let webhooks = Arc::clone(&self.webhooks);
            let group_id = group_id.to_string();
            let body = body.clone();
            tokio::spawn(async move {
                deliver_with_retry(client.as_ref(), webhooks.as_ref(), &webhook, event, &group_id, &body).await;
            });
        }
    }
}

async fn run_one<E: BulkAgentExecutor + ?Sized>(
    agents: &dyn AgentRepository,
    executor: &E,
    agent_name: &str,
    kind: crate::domain::models::BulkOperationKind,
    params: &serde_json::Value,
    timeout: Duration,
) -> BulkAgentResult {
    let started = std::time::Instant::now();
    let outcome = async {
        let agent = agents.get(agent_name).await?;
        executor.execute(&agent.address, kind, params, timeout).await
    }
    .await;

    match outcome {
        Ok(output) => BulkAgentResult {
            agent_name: agent_name.to_string(),
            success: true,
            output,
            error: None,
            duration: started.elapsed(),
        },
        Err(err) => BulkAgentResult {
            agent_name: agent_name.to_string(),
            success: false,
            output: None,
            error: Some(err.to_string()),
            duration: started.elapsed(),
        },
    }
}

async fn deliver_with_retry(
    client: &WebhookClient,
    webhooks: &dyn WebhookRepository,
    webhook: &crate::domain::models::Webhook,
    event: WebhookEvent,
    group_id: &str,
    body: &serde_json::Value,
) {
    let max_attempts = webhook.retry_count.max(1);
    let config = RetryConfig::<String>::new(|_| true);
    let config = RetryConfig {
        max_attempts,
        ..config
    };
    let token = CancellationToken::new();

    let mut last_status: Option<u16> = None;
    let mut attempts_used = 0u32;
    let result = retrier::execute(&config, &token, || {
        attempts_used += 1;
        async {
            let outcome = client.deliver(webhook, event, body).await;
            last_status = outcome.status_code;
            if outcome.success {
                Ok(())
            } else {
                Err(outcome.error.unwrap_or_else(|| "delivery failed".to_string()))
            }
        }
    })
    .await;

    let log = WebhookLog {
        webhook_id: webhook.id,
        event_type: event,
        group_id: group_id.to_string(),
        success: result.is_ok(),
        status_code: last_status,
        error: result.as_ref().err().map(std::string::ToString::to_string),
        retry_count: attempts_used.saturating_sub(1),
        timestamp: Utc::now(),
    };
    if let Err(err) = webhooks.append_log(&log).await {
        tracing::error!(error = %err, webhook_id = %webhook.id, "failed to append webhook delivery log");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteAgentRepository, SqliteGroupRepository, SqliteWebhookRepository,
    };
    use crate::domain::models::{BulkOperationKind, GroupRule, RuleOperator, RuleType};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingExecutor {
        calls: AtomicUsize,
        fail_address: Option<String>,
    }

    #[async_trait]
    impl BulkAgentExecutor for CountingExecutor {
        async fn execute(
            &self,
            address: &str,
            _kind: BulkOperationKind,
            _params: &serde_json::Value,
            _timeout: Duration,
        ) -> DomainResult<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_address.as_deref() == Some(address) {
                Err(DomainError::Transient("agent unreachable".to_string()))
            } else {
                Ok(Some("ok".to_string()))
            }
        }
    }

    fn make_orchestrator(
        groups: Arc<dyn GroupRepository>,
        agents: Arc<dyn AgentRepository>,
        webhooks: Arc<dyn WebhookRepository>,
        executor: Arc<CountingExecutor>,
    ) -> GroupOrchestrator<CountingExecutor> {
        GroupOrchestrator::new(groups, agents, webhooks, executor, chrono::Duration::minutes(5), 4)
    }

    #[tokio::test]
    async fn bulk_execute_reports_per_agent_success_and_failure() {
        let pool = create_migrated_test_pool().await.unwrap();
        let groups: Arc<dyn GroupRepository> = Arc::new(SqliteGroupRepository::new(pool.clone()));
        let agents: Arc<dyn AgentRepository> = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let webhooks: Arc<dyn WebhookRepository> = Arc::new(SqliteWebhookRepository::new(pool));

        agents.upsert("a1", "10.0.0.1:9000", "1.0").await.unwrap();
        agents.upsert("a2", "10.0.0.2:9000", "1.0").await.unwrap();

        let mut group = AgentGroup::new("team-a");
        group.set_members_sorted(vec!["a1".to_string(), "a2".to_string()]);
        groups.create(&group).await.unwrap();
        groups.set_parent(&GroupHierarchy::root("team-a")).await.unwrap();

        let executor = Arc::new(CountingExecutor {
            calls: AtomicUsize::new(0),
            fail_address: Some("10.0.0.2:9000".to_string()),
        });
        let orchestrator = make_orchestrator(groups, agents, webhooks, Arc::clone(&executor));

        let result = orchestrator
            .execute_bulk(
                BulkOperation {
                    group_id: "team-a".to_string(),
                    operation: BulkOperationKind::Shutdown,
                    params: serde_json::json!({}),
                    timeout: Duration::from_secs(2),
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.total_agents, 2);
        assert_eq!(result.success_count, 1);
        assert_eq!(result.failure_count, 1);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    }

    /// An executor whose RPC never completes, so a test can assert that
    /// cancelling the caller's token terminates the outstanding task instead
    /// of letting it run to completion in the background.
    struct HangingExecutor {
        started: AtomicUsize,
        finished: AtomicUsize,
    }

    #[async_trait]
    impl BulkAgentExecutor for HangingExecutor {
        async fn execute(
            &self,
            _address: &str,
            _kind: BulkOperationKind,
            _params: &serde_json::Value,
            _timeout: Duration,
        ) -> DomainResult<Option<String>> {
            self.started.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    #[tokio::test]
    async fn execute_bulk_cancellation_terminates_outstanding_tasks() {
        let pool = create_migrated_test_pool().await.unwrap();
        let groups: Arc<dyn GroupRepository> = Arc::new(SqliteGroupRepository::new(pool.clone()));
        let agents: Arc<dyn AgentRepository> = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let webhooks: Arc<dyn WebhookRepository> = Arc::new(SqliteWebhookRepository::new(pool));

        agents.upsert("a1", "10.0.0.1:9000", "1.0").await.unwrap();
        agents.upsert("a2", "10.0.0.2:9000", "1.0").await.unwrap();

        let mut group = AgentGroup::new("team-b");
        group.set_members_sorted(vec!["a1".to_string(), "a2".to_string()]);
        groups.create(&group).await.unwrap();
        groups.set_parent(&GroupHierarchy::root("team-b")).await.unwrap();

        let executor = Arc::new(HangingExecutor { started: AtomicUsize::new(0), finished: AtomicUsize::new(0) });
        let orchestrator = Arc::new(GroupOrchestrator::new(
            groups,
            agents,
            webhooks,
            Arc::clone(&executor),
            chrono::Duration::minutes(5),
            4,
        ));

        let token = CancellationToken::new();
        let cancel_token = token.clone();
        let orchestrator_clone = Arc::clone(&orchestrator);
        let call = tokio::spawn(async move {
            orchestrator_clone
                .execute_bulk(
                    BulkOperation {
                        group_id: "team-b".to_string(),
                        operation: BulkOperationKind::Shutdown,
                        params: serde_json::json!({}),
                        timeout: Duration::from_secs(30),
                    },
                    &cancel_token,
                )
                .await
        });

        // Give both member tasks a chance to start their (permanently
        // pending) RPC before cancelling.
        while executor.started.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }
        token.cancel();

        let result = call.await.unwrap().unwrap();
        assert_eq!(result.total_agents, 0);
        assert_eq!(executor.finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn set_parent_rejects_self_parenting() {
        let pool = create_migrated_test_pool().await.unwrap();
        let groups: Arc<dyn GroupRepository> = Arc::new(SqliteGroupRepository::new(pool.clone()));
        let agents: Arc<dyn AgentRepository> = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let webhooks: Arc<dyn WebhookRepository> = Arc::new(SqliteWebhookRepository::new(pool));
        let executor = Arc::new(CountingExecutor { calls: AtomicUsize::new(0), fail_address: None });
        let orchestrator = make_orchestrator(groups, agents, webhooks, executor);

        let group = AgentGroup::new("solo");
        orchestrator.create_group(&group).await.unwrap();

        let err = orchestrator.set_parent("solo", "solo").await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn set_parent_rejects_cycle() {
        let pool = create_migrated_test_pool().await.unwrap();
        let groups: Arc<dyn GroupRepository> = Arc::new(SqliteGroupRepository::new(pool.clone()));
        let agents: Arc<dyn AgentRepository> = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let webhooks: Arc<dyn WebhookRepository> = Arc::new(SqliteWebhookRepository::new(pool));
        let executor = Arc::new(CountingExecutor { calls: AtomicUsize::new(0), fail_address: None });
        let orchestrator = make_orchestrator(groups, agents, webhooks, executor);

        orchestrator.create_group(&AgentGroup::new("root")).await.unwrap();
        orchestrator.create_group(&AgentGroup::new("child")).await.unwrap();
        orchestrator.set_parent("child", "root").await.unwrap();

        let err = orchestrator.set_parent("root", "child").await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn delete_group_reparents_children_to_grandparent() {
        let pool = create_migrated_test_pool().await.unwrap();
        let groups: Arc<dyn GroupRepository> = Arc::new(SqliteGroupRepository::new(pool.clone()));
        let agents: Arc<dyn AgentRepository> = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let webhooks: Arc<dyn WebhookRepository> = Arc::new(SqliteWebhookRepository::new(pool));
        let executor = Arc::new(CountingExecutor { calls: AtomicUsize::new(0), fail_address: None });
        let orchestrator = make_orchestrator(groups, agents, webhooks, executor);

        orchestrator.create_group(&AgentGroup::new("grandparent")).await.unwrap();
        orchestrator.create_group(&AgentGroup::new("parent")).await.unwrap();
        orchestrator.create_group(&AgentGroup::new("child")).await.unwrap();
        orchestrator.set_parent("parent", "grandparent").await.unwrap();
        orchestrator.set_parent("child", "parent").await.unwrap();

        orchestrator.delete_group("parent").await.unwrap();

        let child_node = orchestrator.get_hierarchy("child").await.unwrap().unwrap();
        assert_eq!(child_node.parent_id, Some("grandparent".to_string()));
    }

    #[tokio::test]
    async fn auto_discovery_appends_without_removing_existing_members() {
        let pool = create_migrated_test_pool().await.unwrap();
        let groups: Arc<dyn GroupRepository> = Arc::new(SqliteGroupRepository::new(pool.clone()));
        let agents: Arc<dyn AgentRepository> = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let webhooks: Arc<dyn WebhookRepository> = Arc::new(SqliteWebhookRepository::new(pool));
        let executor = Arc::new(CountingExecutor { calls: AtomicUsize::new(0), fail_address: None });

        agents.upsert("a1", "10.0.0.1:9000", "1.0").await.unwrap();
        agents.upsert("a2", "10.0.0.2:9000", "1.0").await.unwrap();

        let mut manual = AgentGroup::new("discovered");
        manual.set_members_sorted(vec!["manual-1".to_string()]);
        groups.create(&manual).await.unwrap();
        groups.set_parent(&GroupHierarchy::root("discovered")).await.unwrap();

        let orchestrator = make_orchestrator(groups, agents, webhooks, executor);
        let config = AutoDiscoveryConfig {
            id: Uuid::new_v4(),
            rules: vec![GroupRule {
                rule_type: RuleType::NamePattern,
                key: String::new(),
                value: "^a".to_string(),
                operator: RuleOperator::Regex,
            }],
            target_group: "discovered".to_string(),
            schedule: Duration::from_secs(60),
            enabled: true,
            last_run: None,
        };
        orchestrator.create_auto_discovery(&config).await.unwrap();

        orchestrator.run_auto_discovery().await.unwrap();

        let refreshed = orchestrator.get_group("discovered").await.unwrap();
        assert!(refreshed.agent_names.contains(&"manual-1".to_string()));
        assert!(refreshed.agent_names.contains(&"a1".to_string()));
        assert!(refreshed.agent_names.contains(&"a2".to_string()));
    }
}
