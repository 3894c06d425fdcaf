//! SQLite implementation of `AgentRepository` — spec.md §4.4.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Agent, AgentStatus};
use crate::domain::ports::AgentRepository;

#[derive(Clone)]
pub struct SqliteAgentRepository {
    pool: SqlitePool,
}

impl SqliteAgentRepository {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentRepository for SqliteAgentRepository {
    async fn upsert(&self, name: &str, address: &str, agent_version: &str) -> DomainResult<Agent> {
        let now = Utc::now();
        let existing: Option<AgentRow> = sqlx::query_as("SELECT * FROM agents WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = existing {
            sqlx::query(
                "UPDATE agents SET address = ?, agent_version = ?, status = ?, last_heartbeat = ?, updated_at = ?
                 WHERE name = ?",
            )
            .bind(address)
            .bind(agent_version)
            .bind(AgentStatus::Active.as_str())
            .bind(now.to_rfc3339())
            .bind(now.to_rfc3339())
            .bind(name)
            .execute(&self.pool)
            .await?;

            let mut agent: Agent = row.try_into()?;
            agent.address = address.to_string();
            agent.agent_version = agent_version.to_string();
            agent.status = AgentStatus::Active;
            agent.last_heartbeat = Some(now);
            agent.updated_at = now;
            return Ok(agent);
        }

        let agent = Agent::register(name, address, agent_version);
        sqlx::query(
            "INSERT INTO agents (name, address, status, last_heartbeat, registered_at, updated_at,
             last_info_collected, system_info, agent_version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&agent.name)
        .bind(&agent.address)
        .bind(agent.status.as_str())
        .bind(agent.last_heartbeat.map(|t| t.to_rfc3339()))
        .bind(agent.registered_at.to_rfc3339())
        .bind(agent.updated_at.to_rfc3339())
        .bind(agent.last_info_collected.map(|t| t.to_rfc3339()))
        .bind(agent.system_info.as_ref().map(std::string::ToString::to_string))
        .bind(&agent.agent_version)
        .execute(&self.pool)
        .await?;

        Ok(agent)
    }

    async fn heartbeat(&self, name: &str) -> DomainResult<()> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query("UPDATE agents SET status = ?, last_heartbeat = ?, updated_at = ? WHERE name = ?")
            .bind(AgentStatus::Active.as_str())
            .bind(&now)
            .bind(&now)
            .bind(name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("agent '{name}'")));
        }
        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<Agent>> {
        let rows: Vec<AgentRow> = sqlx::query_as("SELECT * FROM agents ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get(&self, name: &str) -> DomainResult<Agent> {
        let row: Option<AgentRow> = sqlx::query_as("SELECT * FROM agents WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or_else(|| DomainError::NotFound(format!("agent '{name}'")))?
            .try_into()
    }

    async fn delete(&self, name: &str) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM agents WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("agent '{name}'")));
        }
        Ok(())
    }

    async fn update_system_info(&self, name: &str, doc: serde_json::Value) -> DomainResult<()> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE agents SET system_info = ?, last_info_collected = ?, updated_at = ? WHERE name = ?",
        )
        .bind(doc.to_string())
        .bind(&now)
        .bind(&now)
        .bind(name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("agent '{name}'")));
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    name: String,
    address: String,
    status: String,
    last_heartbeat: Option<String>,
    registered_at: String,
    updated_at: String,
    last_info_collected: Option<String>,
    system_info: Option<String>,
    agent_version: String,
}

impl TryFrom<AgentRow> for Agent {
    type Error = DomainError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        let status = AgentStatus::parse_str(&row.status)
            .ok_or_else(|| DomainError::Fatal(format!("invalid agent status '{}'", row.status)))?;

        Ok(Agent {
            name: row.name,
            address: row.address,
            status,
            last_heartbeat: super::parse_optional_datetime(row.last_heartbeat)?,
            registered_at: super::parse_datetime(&row.registered_at)?,
            updated_at: super::parse_datetime(&row.updated_at)?,
            last_info_collected: super::parse_optional_datetime(row.last_info_collected)?,
            system_info: row
                .system_info
                .map(|s| serde_json::from_str(&s))
                .transpose()?,
            agent_version: row.agent_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn setup() -> SqliteAgentRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteAgentRepository::new(pool)
    }

    #[tokio::test]
    async fn upsert_creates_then_updates_in_place() {
        let repo = setup().await;
        let first = repo.upsert("worker-1", "10.0.0.1:9000", "1.0.0").await.unwrap();
        assert_eq!(first.status, AgentStatus::Active);

        let second = repo.upsert("worker-1", "10.0.0.2:9000", "1.0.1").await.unwrap();
        assert_eq!(second.address, "10.0.0.2:9000");
        assert_eq!(second.agent_version, "1.0.1");

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn heartbeat_on_unknown_agent_is_not_found() {
        let repo = setup().await;
        let err = repo.heartbeat("ghost").await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let repo = setup().await;
        repo.upsert("worker-1", "10.0.0.1:9000", "1.0.0").await.unwrap();
        repo.delete("worker-1").await.unwrap();
        assert!(matches!(repo.get("worker-1").await.unwrap_err(), DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_system_info_round_trips_json() {
        let repo = setup().await;
        repo.upsert("worker-1", "10.0.0.1:9000", "1.0.0").await.unwrap();
        repo.update_system_info("worker-1", serde_json::json!({"os": "linux"})).await.unwrap();
        let agent = repo.get("worker-1").await.unwrap();
        assert_eq!(agent.system_info.unwrap()["os"], "linux");
    }
}
