//! Hook dispatcher — spec.md §4.8.
//!
//! Pops pending events, matches enabled hooks by event type and stack, runs
//! each hook's script as a child process with the event payload on stdin,
//! records one `HookResult` per execution, and transitions the event to its
//! terminal status.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Event, EventStatus, Hook, HookResult, HookStats};
use crate::domain::ports::{EventQueue, HookRepository};

pub struct HookDispatcher {
    events: Arc<dyn EventQueue>,
    hooks: Arc<dyn HookRepository>,
    batch_size: i64,
    execution_timeout: Duration,
    stack_filter: Option<String>,
}

impl HookDispatcher {
    #[must_use]
    pub fn new(
        events: Arc<dyn EventQueue>,
        hooks: Arc<dyn HookRepository>,
        batch_size: i64,
        execution_timeout: Duration,
        stack_filter: Option<String>,
    ) -> Self {
        Self {
            events,
            hooks,
            batch_size,
            execution_timeout,
            stack_filter,
        }
    }

    /// One dispatch pass: drains up to `batch_size` pending events, runs
    /// every matching hook for each, and terminates the event. Returns how
    /// many events this pass claimed and processed.
    #[instrument(skip(self))]
    pub async fn dispatch_once(&self) -> DomainResult<usize> {
        let pending = self.events.get_pending(self.batch_size).await?;
        let mut processed = 0;
        for event in pending {
            let Some(claimed) = self.events.claim(event.id).await? else {
                continue;
            };
            self.process_event(claimed).await?;
            processed += 1;
        }
        Ok(processed)
    }

    async fn process_event(&self, event: Event) -> DomainResult<()> {
        let hooks = self.hooks.list().await?;
        let matching: Vec<Hook> = hooks
            .into_iter()
            .filter(|hook| hook.matches(&event.event_type, self.stack_filter.as_deref()))
            .collect();

        let mut any_failed = false;
        for hook in &matching {
            let outcome = self.run_hook(hook, &event).await;
            any_failed |= !outcome.success;
            self.hooks.record_result(&outcome).await?;
            self.hooks.increment_run_count(hook.id).await?;
        }

        let final_status = if any_failed { EventStatus::Failed } else { EventStatus::Completed };
        let error = if any_failed {
            Some("one or more hooks failed".to_string())
        } else {
            None
        };
        self.events.update_status(event.id, final_status, error).await
    }

    async fn run_hook(&self, hook: &Hook, event: &Event) -> HookResult {
        let started = Instant::now();
        let timestamp = chrono::Utc::now();
        let payload = event.payload.to_string();

        let spawned = Command::new(&hook.file_path)
            .env("FLEET_EVENT_TYPE", event.event_type.as_str())
            .env("FLEET_EVENT_ID", event.id.to_string())
            .env("FLEET_EVENT_AGENT", &event.agent)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                return HookResult {
                    hook_id: hook.id,
                    event_id: event.id,
                    success: false,
                    duration: started.elapsed(),
                    output: String::new(),
                    error: Some(format!("failed to spawn hook script: {err}")),
                    timestamp,
                };
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(payload.as_bytes()).await;
        }

        match tokio::time::timeout(self.execution_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => HookResult {
                hook_id: hook.id,
                event_id: event.id,
                success: output.status.success(),
                duration: started.elapsed(),
                output: String::from_utf8_lossy(&output.stdout).into_owned(),
                error: if output.status.success() {
                    None
                } else {
                    Some(String::from_utf8_lossy(&output.stderr).into_owned())
                },
                timestamp,
            },
            Ok(Err(err)) => HookResult {
                hook_id: hook.id,
                event_id: event.id,
                success: false,
                duration: started.elapsed(),
                output: String::new(),
                error: Some(err.to_string()),
                timestamp,
            },
            Err(_) => HookResult {
                hook_id: hook.id,
                event_id: event.id,
                success: false,
                duration: started.elapsed(),
                output: String::new(),
                error: Some(format!("hook execution exceeded {:?}", self.execution_timeout)),
                timestamp,
            },
        }
    }

    /// Computed on demand by scanning recent `HookResult` rows, per spec.md
    /// §4.8 (no running aggregate is persisted).
    pub async fn stats(&self, hook_id: Uuid, limit: i64) -> DomainResult<HookStats> {
        let results = self.hooks.recent_results(hook_id, limit).await?;
        Ok(HookStats::from_results(&results))
    }

    /// Runs `dispatch_once` on a fixed tick until `token` is cancelled.
    pub async fn run_loop(&self, tick: Duration, token: CancellationToken) {
        let mut ticker = tokio::time::interval(tick);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.dispatch_once().await {
                        tracing::error!(error = %err, "hook dispatch cycle failed");
                    }
                }
                () = token.cancelled() => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteEventRepository, SqliteHookRepository};
    use crate::domain::models::EventType;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(dir: &tempfile::TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh\n{body}").unwrap();
        let mut perms = file.metadata().unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn matching_enabled_hook_runs_and_completes_event() {
        let pool = create_migrated_test_pool().await.unwrap();
        let events: Arc<dyn EventQueue> = Arc::new(SqliteEventRepository::new(pool.clone()));
        let hooks: Arc<dyn HookRepository> = Arc::new(SqliteHookRepository::new(pool));

        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "ok.sh", "cat > /dev/null\nexit 0");

        let mut matching_hook = Hook::new("h1", &script);
        matching_hook.event_type = Some(EventType::CpuHigh);
        hooks.create(&matching_hook).await.unwrap();

        let mut disabled_hook = Hook::new("h2", &script);
        disabled_hook.enabled = false;
        hooks.create(&disabled_hook).await.unwrap();

        let event = events
            .enqueue(EventType::CpuHigh, "agent-a", serde_json::json!({"cpu": 95}))
            .await
            .unwrap();

        let dispatcher = HookDispatcher::new(Arc::clone(&events), Arc::clone(&hooks), 10, Duration::from_secs(5), None);
        let processed = dispatcher.dispatch_once().await.unwrap();
        assert_eq!(processed, 1);

        let refreshed = events.get_event(event.id).await.unwrap();
        assert_eq!(refreshed.status, EventStatus::Completed);

        let h1 = hooks.get(matching_hook.id).await.unwrap();
        assert_eq!(h1.run_count, 1);
        let h2 = hooks.get(disabled_hook.id).await.unwrap();
        assert_eq!(h2.run_count, 0);
    }

    #[tokio::test]
    async fn failing_hook_marks_event_failed() {
        let pool = create_migrated_test_pool().await.unwrap();
        let events: Arc<dyn EventQueue> = Arc::new(SqliteEventRepository::new(pool.clone()));
        let hooks: Arc<dyn HookRepository> = Arc::new(SqliteHookRepository::new(pool));

        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "fail.sh", "exit 1");
        hooks.create(&Hook::new("boom", &script)).await.unwrap();

        let event = events.enqueue(EventType::DiskHigh, "agent-a", serde_json::json!({})).await.unwrap();
        let dispatcher = HookDispatcher::new(Arc::clone(&events), hooks, 10, Duration::from_secs(5), None);
        dispatcher.dispatch_once().await.unwrap();

        let refreshed = events.get_event(event.id).await.unwrap();
        assert_eq!(refreshed.status, EventStatus::Failed);
    }

    #[tokio::test]
    async fn no_matching_hooks_completes_event_with_zero_runs() {
        let pool = create_migrated_test_pool().await.unwrap();
        let events: Arc<dyn EventQueue> = Arc::new(SqliteEventRepository::new(pool.clone()));
        let hooks: Arc<dyn HookRepository> = Arc::new(SqliteHookRepository::new(pool));

        let event = events
            .enqueue(EventType::PortOpen, "agent-a", serde_json::json!({}))
            .await
            .unwrap();
        let dispatcher = HookDispatcher::new(Arc::clone(&events), hooks, 10, Duration::from_secs(5), None);
        let processed = dispatcher.dispatch_once().await.unwrap();
        assert_eq!(processed, 1);

        let refreshed = events.get_event(event.id).await.unwrap();
        assert_eq!(refreshed.status, EventStatus::Completed);
    }
}
