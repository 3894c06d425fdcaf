//! SQLite implementation of `GroupRepository` — spec.md §4.9.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AgentGroup, AutoDiscoveryConfig, GroupHierarchy, GroupRule, GroupTemplate};
use crate::domain::ports::GroupRepository;

#[derive(Clone)]
pub struct SqliteGroupRepository {
    pool: SqlitePool,
}

impl SqliteGroupRepository {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GroupRepository for SqliteGroupRepository {
    async fn create(&self, group: &AgentGroup) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO agent_groups (id, description, tags, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&group.id)
        .bind(&group.description)
        .bind(serde_json::to_string(&group.tags)?)
        .bind(group.created_at.to_rfc3339())
        .bind(group.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for name in &group.agent_names {
            sqlx::query("INSERT INTO group_membership (group_id, agent_name) VALUES (?, ?)")
                .bind(&group.id)
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> DomainResult<AgentGroup> {
        let row: Option<GroupRow> = sqlx::query_as("SELECT * FROM agent_groups WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let row = row.ok_or_else(|| DomainError::NotFound(format!("group '{id}'")))?;

        let members: Vec<(String,)> = sqlx::query_as(
            "SELECT agent_name FROM group_membership WHERE group_id = ? ORDER BY agent_name",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut group: AgentGroup = row.try_into()?;
        group.agent_names = members.into_iter().map(|(n,)| n).collect();
        Ok(group)
    }

    async fn update(&self, group: &AgentGroup) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE agent_groups SET description = ?, tags = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&group.description)
        .bind(serde_json::to_string(&group.tags)?)
        .bind(group.updated_at.to_rfc3339())
        .bind(&group.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("group '{}'", group.id)));
        }

        sqlx::query("DELETE FROM group_membership WHERE group_id = ?")
            .bind(&group.id)
            .execute(&mut *tx)
            .await?;
        for name in &group.agent_names {
            sqlx::query("INSERT INTO group_membership (group_id, agent_name) VALUES (?, ?)")
                .bind(&group.id)
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> DomainResult<()> {
        // Membership cascades via the foreign key. Hierarchy rows are left
        // for the caller: the orchestrator service re-parents children
        // before calling `delete_hierarchy_node`, per the documented
        // resolution of the hierarchy-removal open question.
        let result = sqlx::query("DELETE FROM agent_groups WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("group '{id}'")));
        }
        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<AgentGroup>> {
        let rows: Vec<GroupRow> = sqlx::query_as("SELECT * FROM agent_groups ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let mut groups = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id.clone();
            let mut group: AgentGroup = row.try_into()?;
            let members: Vec<(String,)> = sqlx::query_as(
                "SELECT agent_name FROM group_membership WHERE group_id = ? ORDER BY agent_name",
            )
            .bind(&id)
            .fetch_all(&self.pool)
            .await?;
            group.agent_names = members.into_iter().map(|(n,)| n).collect();
            groups.push(group);
        }
        Ok(groups)
    }

    async fn get_hierarchy(&self, group_id: &str) -> DomainResult<Option<GroupHierarchy>> {
        let row: Option<HierarchyRow> = sqlx::query_as("SELECT * FROM group_hierarchy WHERE group_id = ?")
            .bind(group_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Into::into).map(Ok).transpose()
    }

    async fn set_parent(&self, node: &GroupHierarchy) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO group_hierarchy (group_id, parent_id, level, path) VALUES (?, ?, ?, ?)
             ON CONFLICT(group_id) DO UPDATE SET parent_id = excluded.parent_id,
             level = excluded.level, path = excluded.path",
        )
        .bind(&node.group_id)
        .bind(&node.parent_id)
        .bind(i64::from(node.level))
        .bind(&node.path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn hierarchy_chain(&self, group_id: &str) -> DomainResult<Vec<GroupHierarchy>> {
        let mut chain = Vec::new();
        let mut current = group_id.to_string();
        loop {
            let Some(node) = self.get_hierarchy(&current).await? else { break };
            let parent = node.parent_id.clone();
            chain.push(node);
            match parent {
                Some(p) => current = p,
                None => break,
            }
        }
        Ok(chain)
    }

    async fn hierarchy_children(&self, group_id: &str) -> DomainResult<Vec<GroupHierarchy>> {
        let rows: Vec<HierarchyRow> = sqlx::query_as("SELECT * FROM group_hierarchy WHERE parent_id = ?")
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_hierarchy_node(&self, group_id: &str) -> DomainResult<()> {
        sqlx::query("DELETE FROM group_hierarchy WHERE group_id = ?")
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_template(&self, template: &GroupTemplate) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO group_templates (id, name, description, tags, rules) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(template.id.to_string())
        .bind(&template.name)
        .bind(&template.description)
        .bind(serde_json::to_string(&template.tags)?)
        .bind(serde_json::to_string(&template.rules)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_template(&self, id: Uuid) -> DomainResult<GroupTemplate> {
        let row: Option<TemplateRow> = sqlx::query_as("SELECT * FROM group_templates WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or_else(|| DomainError::NotFound(format!("group template '{id}'")))?
            .try_into()
    }

    async fn list_templates(&self) -> DomainResult<Vec<GroupTemplate>> {
        let rows: Vec<TemplateRow> = sqlx::query_as("SELECT * FROM group_templates ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn delete_template(&self, id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM group_templates WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("group template '{id}'")));
        }
        Ok(())
    }

    async fn create_auto_discovery(&self, config: &AutoDiscoveryConfig) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO auto_discovery_configs (id, rules, target_group, schedule_seconds, enabled, last_run)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(config.id.to_string())
        .bind(serde_json::to_string(&config.rules)?)
        .bind(&config.target_group)
        .bind(i64::try_from(config.schedule.as_secs()).unwrap_or(i64::MAX))
        .bind(i64::from(config.enabled))
        .bind(config.last_run.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_auto_discovery(&self) -> DomainResult<Vec<AutoDiscoveryConfig>> {
        let rows: Vec<AutoDiscoveryRow> = sqlx::query_as("SELECT * FROM auto_discovery_configs ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update_auto_discovery_last_run(&self, id: Uuid, run_at: DateTime<Utc>) -> DomainResult<()> {
        let result = sqlx::query("UPDATE auto_discovery_configs SET last_run = ? WHERE id = ?")
            .bind(run_at.to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("auto-discovery config '{id}'")));
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: String,
    description: String,
    tags: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<GroupRow> for AgentGroup {
    type Error = DomainError;

    fn try_from(row: GroupRow) -> Result<Self, Self::Error> {
        Ok(AgentGroup {
            id: row.id,
            description: row.description,
            tags: serde_json::from_str(&row.tags)?,
            agent_names: Vec::new(),
            created_at: super::parse_datetime(&row.created_at)?,
            updated_at: super::parse_datetime(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HierarchyRow {
    group_id: String,
    parent_id: Option<String>,
    level: i64,
    path: String,
}

impl From<HierarchyRow> for GroupHierarchy {
    fn from(row: HierarchyRow) -> Self {
        GroupHierarchy {
            group_id: row.group_id,
            parent_id: row.parent_id,
            level: u32::try_from(row.level).unwrap_or(0),
            path: row.path,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: String,
    name: String,
    description: String,
    tags: String,
    rules: String,
}

impl TryFrom<TemplateRow> for GroupTemplate {
    type Error = DomainError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        Ok(GroupTemplate {
            id: super::parse_uuid(&row.id)?,
            name: row.name,
            description: row.description,
            tags: serde_json::from_str(&row.tags)?,
            rules: serde_json::from_str::<Vec<GroupRule>>(&row.rules)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AutoDiscoveryRow {
    id: String,
    rules: String,
    target_group: String,
    schedule_seconds: i64,
    enabled: i64,
    last_run: Option<String>,
}

impl TryFrom<AutoDiscoveryRow> for AutoDiscoveryConfig {
    type Error = DomainError;

    fn try_from(row: AutoDiscoveryRow) -> Result<Self, Self::Error> {
        Ok(AutoDiscoveryConfig {
            id: super::parse_uuid(&row.id)?,
            rules: serde_json::from_str(&row.rules)?,
            target_group: row.target_group,
            schedule: Duration::from_secs(u64::try_from(row.schedule_seconds).unwrap_or(0)),
            enabled: row.enabled != 0,
            last_run: super::parse_optional_datetime(row.last_run)?,
        })
    }
}
