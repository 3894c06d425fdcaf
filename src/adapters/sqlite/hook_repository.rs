//! SQLite implementation of `HookRepository` — spec.md §4.8.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::event::EventType;
use crate::domain::models::{Hook, HookResult};
use crate::domain::ports::HookRepository;

#[derive(Clone)]
pub struct SqliteHookRepository {
    pool: SqlitePool,
}

impl SqliteHookRepository {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HookRepository for SqliteHookRepository {
    async fn create(&self, hook: &Hook) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO hooks (id, name, description, event_type, file_path, stack, enabled,
             run_count, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(hook.id.to_string())
        .bind(&hook.name)
        .bind(&hook.description)
        .bind(hook.event_type.as_ref().map(EventType::as_str))
        .bind(&hook.file_path)
        .bind(&hook.stack)
        .bind(i64::from(hook.enabled))
        .bind(i64::try_from(hook.run_count).unwrap_or(i64::MAX))
        .bind(hook.created_at.to_rfc3339())
        .bind(hook.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Hook> {
        let row: Option<HookRow> = sqlx::query_as("SELECT * FROM hooks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or_else(|| DomainError::NotFound(format!("hook '{id}'")))?
            .try_into()
    }

    async fn update(&self, hook: &Hook) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE hooks SET name = ?, description = ?, event_type = ?, file_path = ?,
             stack = ?, enabled = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&hook.name)
        .bind(&hook.description)
        .bind(hook.event_type.as_ref().map(EventType::as_str))
        .bind(&hook.file_path)
        .bind(&hook.stack)
        .bind(i64::from(hook.enabled))
        .bind(Utc::now().to_rfc3339())
        .bind(hook.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("hook '{}'", hook.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM hooks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("hook '{id}'")));
        }
        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<Hook>> {
        let rows: Vec<HookRow> = sqlx::query_as("SELECT * FROM hooks ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> DomainResult<()> {
        let result = sqlx::query("UPDATE hooks SET enabled = ?, updated_at = ? WHERE id = ?")
            .bind(i64::from(enabled))
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("hook '{id}'")));
        }
        Ok(())
    }

    async fn increment_run_count(&self, id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("UPDATE hooks SET run_count = run_count + 1, updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("hook '{id}'")));
        }
        Ok(())
    }

    async fn record_result(&self, result: &HookResult) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO hook_results (hook_id, event_id, success, duration_ms, output, error, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(result.hook_id.to_string())
        .bind(result.event_id.to_string())
        .bind(i64::from(result.success))
        .bind(i64::try_from(result.duration.as_millis()).unwrap_or(i64::MAX))
        .bind(&result.output)
        .bind(&result.error)
        .bind(result.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_results(&self, hook_id: Uuid, limit: i64) -> DomainResult<Vec<HookResult>> {
        let rows: Vec<HookResultRow> = sqlx::query_as(
            "SELECT * FROM hook_results WHERE hook_id = ? ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(hook_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct HookRow {
    id: String,
    name: String,
    description: String,
    event_type: Option<String>,
    file_path: String,
    stack: String,
    enabled: i64,
    run_count: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<HookRow> for Hook {
    type Error = DomainError;

    fn try_from(row: HookRow) -> Result<Self, Self::Error> {
        Ok(Hook {
            id: super::parse_uuid(&row.id)?,
            name: row.name,
            description: row.description,
            event_type: row.event_type.map(|s| EventType::parse_str(&s)),
            file_path: row.file_path,
            stack: row.stack,
            enabled: row.enabled != 0,
            run_count: u64::try_from(row.run_count).unwrap_or(0),
            created_at: super::parse_datetime(&row.created_at)?,
            updated_at: super::parse_datetime(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HookResultRow {
    hook_id: String,
    event_id: String,
    success: i64,
    duration_ms: i64,
    output: String,
    error: Option<String>,
    timestamp: String,
}

impl TryFrom<HookResultRow> for HookResult {
    type Error = DomainError;

    fn try_from(row: HookResultRow) -> Result<Self, Self::Error> {
        Ok(HookResult {
            hook_id: super::parse_uuid(&row.hook_id)?,
            event_id: super::parse_uuid(&row.event_id)?,
            success: row.success != 0,
            duration: std::time::Duration::from_millis(u64::try_from(row.duration_ms).unwrap_or(0)),
            output: row.output,
            error: row.error,
            timestamp: super::parse_datetime(&row.timestamp)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn setup() -> SqliteHookRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteHookRepository::new(pool)
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let repo = setup().await;
        let hook = Hook::new("cpu-alert", "/opt/hooks/cpu.sh");
        repo.create(&hook).await.unwrap();
        let fetched = repo.get(hook.id).await.unwrap();
        assert_eq!(fetched.name, "cpu-alert");
        assert!(fetched.enabled);
    }

    #[tokio::test]
    async fn set_enabled_flips_the_flag() {
        let repo = setup().await;
        let hook = Hook::new("toggle", "/opt/hooks/x.sh");
        repo.create(&hook).await.unwrap();
        repo.set_enabled(hook.id, false).await.unwrap();
        assert!(!repo.get(hook.id).await.unwrap().enabled);
    }

    #[tokio::test]
    async fn record_result_and_recent_results() {
        let repo = setup().await;
        let hook = Hook::new("logger", "/opt/hooks/log.sh");
        repo.create(&hook).await.unwrap();
        let result = HookResult {
            hook_id: hook.id,
            event_id: Uuid::new_v4(),
            success: true,
            duration: std::time::Duration::from_millis(5),
            output: "ok".to_string(),
            error: None,
            timestamp: Utc::now(),
        };
        repo.record_result(&result).await.unwrap();
        let recent = repo.recent_results(hook.id, 10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert!(recent[0].success);
    }
}
