//! SQLite database migration management.

use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Failed to execute migration {version}: {source}")]
    ExecutionError { version: i64, #[source] source: sqlx::Error },
    #[error("Failed to get schema version: {0}")]
    VersionCheckError(#[source] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: String,
    pub sql: String,
}

pub struct Migrator {
    pool: SqlitePool,
}

impl Migrator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_embedded_migrations(&self, migrations: Vec<Migration>) -> Result<usize, MigrationError> {
        self.ensure_migrations_table().await?;
        let current_version = self.get_current_version().await?;
        let pending: Vec<_> = migrations.into_iter().filter(|m| m.version > current_version).collect();

        if pending.is_empty() {
            return Ok(0);
        }

        for migration in &pending {
            self.apply_migration(migration).await?;
        }

        Ok(pending.len())
    }

    async fn ensure_migrations_table(&self) -> Result<(), MigrationError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now')),
                description TEXT
            )"
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MigrationError::ExecutionError { version: 0, source: e })?;
        Ok(())
    }

    pub async fn get_current_version(&self) -> Result<i64, MigrationError> {
        let result: Option<(i64,)> = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_optional(&self.pool)
            .await
            .map_err(MigrationError::VersionCheckError)?;
        Ok(result.map(|(v,)| v).unwrap_or(0))
    }

    async fn apply_migration(&self, migration: &Migration) -> Result<(), MigrationError> {
        sqlx::raw_sql(&migration.sql)
            .execute(&self.pool)
            .await
            .map_err(|e| MigrationError::ExecutionError { version: migration.version, source: e })?;

        sqlx::query("INSERT OR IGNORE INTO schema_migrations (version, description) VALUES (?, ?)")
            .bind(migration.version)
            .bind(&migration.description)
            .execute(&self.pool)
            .await
            .map_err(|e| MigrationError::ExecutionError { version: migration.version, source: e })?;

        Ok(())
    }
}

/// Schema for every subsystem named in spec.md §6 "Persisted state layout":
/// agents, metrics, hooks+events, groups+group advanced features, webhooks.
/// Kept as one embedded migration set (rather than per-subsystem files)
/// since the crate uses one SQLite file per logical database but a single
/// code path to create all of them.
pub fn all_embedded_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "fleet control plane core schema".to_string(),
        sql: r"
            CREATE TABLE IF NOT EXISTS agents (
                name TEXT PRIMARY KEY,
                address TEXT NOT NULL,
                status TEXT NOT NULL,
                last_heartbeat TEXT,
                registered_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_info_collected TEXT,
                system_info TEXT,
                agent_version TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS metric_points (
                agent_name TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                cpu_percent REAL NOT NULL,
                memory_percent REAL NOT NULL,
                memory_used_bytes INTEGER NOT NULL,
                disk_percent REAL NOT NULL,
                load_avg_1 REAL NOT NULL,
                load_avg_5 REAL NOT NULL,
                load_avg_15 REAL NOT NULL,
                process_count INTEGER NOT NULL,
                network_rx_bytes INTEGER,
                network_tx_bytes INTEGER,
                PRIMARY KEY (agent_name, timestamp)
            );
            CREATE INDEX IF NOT EXISTS idx_metric_points_timestamp ON metric_points (timestamp);

            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                event_type TEXT NOT NULL,
                agent TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_error TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_events_status_created ON events (status, created_at);
            CREATE INDEX IF NOT EXISTS idx_events_type ON events (event_type);

            CREATE TABLE IF NOT EXISTS hooks (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                event_type TEXT,
                file_path TEXT NOT NULL,
                stack TEXT NOT NULL DEFAULT 'default',
                enabled INTEGER NOT NULL DEFAULT 1,
                run_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS hook_results (
                hook_id TEXT NOT NULL,
                event_id TEXT NOT NULL,
                success INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                output TEXT NOT NULL,
                error TEXT,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_hook_results_hook ON hook_results (hook_id, timestamp);

            CREATE TABLE IF NOT EXISTS agent_groups (
                id TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                tags TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS group_membership (
                group_id TEXT NOT NULL REFERENCES agent_groups(id) ON DELETE CASCADE,
                agent_name TEXT NOT NULL,
                PRIMARY KEY (group_id, agent_name)
            );

            CREATE TABLE IF NOT EXISTS group_hierarchy (
                group_id TEXT PRIMARY KEY,
                parent_id TEXT,
                level INTEGER NOT NULL,
                path TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS group_templates (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                tags TEXT NOT NULL,
                rules TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS auto_discovery_configs (
                id TEXT PRIMARY KEY,
                rules TEXT NOT NULL,
                target_group TEXT NOT NULL,
                schedule_seconds INTEGER NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                last_run TEXT
            );

            CREATE TABLE IF NOT EXISTS webhooks (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                events TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                secret TEXT NOT NULL,
                headers TEXT NOT NULL,
                retry_count INTEGER NOT NULL,
                timeout_seconds INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS webhook_logs (
                webhook_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                group_id TEXT NOT NULL,
                success INTEGER NOT NULL,
                status_code INTEGER,
                error TEXT,
                retry_count INTEGER NOT NULL,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_webhook_logs_webhook ON webhook_logs (webhook_id, timestamp);
        "
        .to_string(),
    }]
}
