//! `AgentClient` — a typed wrapper over the generated `AgentServiceClient`,
//! one method per RPC in spec.md §6's agent-facing surface, plus the
//! `Dialer<Channel>` used to back `reliability::pool::ConnectionPool`.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};

use crate::domain::errors::{DomainError, DomainResult};
use crate::reliability::object_pool::ObjectPool;
use crate::reliability::pool::Dialer;

use super::generated::agent_service_client::AgentServiceClient;
use super::generated::{
    DiskInfo, DiskInfoRequest, GetWatcherRequest, ListWatchersRequest, NetworkInfo,
    NetworkInfoRequest, ProcessList, ProcessListRequest, RegisterWatcherRequest,
    RemoveWatcherRequest, ResourceUsage, ResourceUsageRequest, RestartServiceRequest,
    RunCommandRequest, ShutdownRequest, UpdateAgentRequest, WatcherInfo,
};

/// Dials a fresh gRPC channel to an agent's `host:port` address. Used as the
/// `Dialer` for `ConnectionPool<Channel, AgentClientDialer>`.
#[derive(Debug, Clone)]
pub struct AgentClientDialer {
    pub connect_timeout: Duration,
}

#[async_trait]
impl Dialer<Channel> for AgentClientDialer {
    async fn dial(&self, address: &str) -> DomainResult<Channel> {
        let endpoint = Endpoint::from_shared(format!("http://{address}"))
            .map_err(|e| DomainError::Validation(format!("invalid agent address '{address}': {e}")))?
            .connect_timeout(self.connect_timeout);
        endpoint
            .connect()
            .await
            .map_err(|e| DomainError::Transient(format!("connect to {address}: {e}")))
    }
}

/// Thin wrapper over a generated `AgentServiceClient<Channel>`. Cloning is
/// cheap (a `tonic::transport::Channel` clone), matching the pool's
/// acquire-then-clone pattern.
#[derive(Clone)]
pub struct AgentClient {
    inner: AgentServiceClient<Channel>,
}

impl AgentClient {
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: AgentServiceClient::new(channel),
        }
    }

    pub async fn get_resource_usage(&self) -> DomainResult<ResourceUsage> {
        let mut client = self.inner.clone();
        Ok(client
            .get_resource_usage(ResourceUsageRequest {})
            .await?
            .into_inner())
    }

    pub async fn get_process_list(&self) -> DomainResult<ProcessList> {
        let mut client = self.inner.clone();
        Ok(client.get_process_list(ProcessListRequest {}).await?.into_inner())
    }

    pub async fn get_network_info(&self) -> DomainResult<NetworkInfo> {
        let mut client = self.inner.clone();
        Ok(client.get_network_info(NetworkInfoRequest {}).await?.into_inner())
    }

    pub async fn get_disk_info(&self) -> DomainResult<DiskInfo> {
        let mut client = self.inner.clone();
        Ok(client.get_disk_info(DiskInfoRequest {}).await?.into_inner())
    }

    /// Runs `command` on the agent and drains the `CommandChunk` stream,
    /// returning the concatenated stdout/stderr and the final exit code.
    /// Callers needing incremental output should talk to the generated
    /// client directly; the bulk-operation executor only needs the result.
    ///
    /// Accumulates chunk bytes into buffers borrowed from a process-wide
    /// `ObjectPool`, returning them once the command completes.
    pub async fn run_command(&self, command: &str, timeout: Duration) -> DomainResult<(String, String, i32)> {
        let mut client = self.inner.clone();
        let request = RunCommandRequest {
            command: command.to_string(),
            timeout_seconds: i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX),
        };
        let mut stream = client.run_command(request).await?.into_inner();

        let pool = chunk_buffer_pool();
        let mut stdout_buf = pool.get();
        let mut stderr_buf = pool.get();
        stdout_buf.clear();
        stderr_buf.clear();

        let mut exit_code = 0;
        while let Some(chunk) = stream.message().await? {
            stdout_buf.extend_from_slice(&chunk.stdout_chunk);
            stderr_buf.extend_from_slice(&chunk.stderr_chunk);
            if chunk.finished {
                exit_code = chunk.exit_code;
            }
        }

        let stdout = String::from_utf8_lossy(&stdout_buf).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_buf).into_owned();
        pool.put(stdout_buf);
        pool.put(stderr_buf);
        Ok((stdout, stderr, exit_code))
    }

    pub async fn restart_service(&self, service_name: &str) -> DomainResult<()> {
        let mut client = self.inner.clone();
        client
            .restart_service(RestartServiceRequest {
                service_name: service_name.to_string(),
            })
            .await?;
        Ok(())
    }

    pub async fn shutdown(&self) -> DomainResult<()> {
        let mut client = self.inner.clone();
        client.shutdown(ShutdownRequest {}).await?;
        Ok(())
    }

    pub async fn update_agent(&self, target_version: &str, force: bool, skip_restart: bool) -> DomainResult<()> {
        let mut client = self.inner.clone();
        client
            .update_agent(UpdateAgentRequest {
                target_version: target_version.to_string(),
                force,
                skip_restart,
            })
            .await?;
        Ok(())
    }

    pub async fn register_watcher(&self, kind: &str, target: &str, config_json: &str) -> DomainResult<String> {
        let mut client = self.inner.clone();
        let reply = client
            .register_watcher(RegisterWatcherRequest {
                kind: kind.to_string(),
                target: target.to_string(),
                config_json: config_json.to_string(),
            })
            .await?
            .into_inner();
        Ok(reply.watcher_id)
    }

    pub async fn list_watchers(&self) -> DomainResult<Vec<WatcherInfo>> {
        let mut client = self.inner.clone();
        let reply = client.list_watchers(ListWatchersRequest {}).await?.into_inner();
        Ok(reply.watchers)
    }

    pub async fn get_watcher(&self, watcher_id: &str) -> DomainResult<WatcherInfo> {
        let mut client = self.inner.clone();
        Ok(client
            .get_watcher(GetWatcherRequest {
                watcher_id: watcher_id.to_string(),
            })
            .await?
            .into_inner())
    }

    pub async fn remove_watcher(&self, watcher_id: &str) -> DomainResult<()> {
        let mut client = self.inner.clone();
        client
            .remove_watcher(RemoveWatcherRequest {
                watcher_id: watcher_id.to_string(),
            })
            .await?;
        Ok(())
    }
}

/// Shared buffer pool for `run_command`'s chunk accumulation, amortizing
/// allocation across the many short-lived `AgentClient` values the
/// connection pool hands out.
fn chunk_buffer_pool() -> &'static ObjectPool<Vec<u8>> {
    static POOL: OnceLock<ObjectPool<Vec<u8>>> = OnceLock::new();
    POOL.get_or_init(|| ObjectPool::new(32, || Vec::with_capacity(4096)))
}
