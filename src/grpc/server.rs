//! `FleetServiceImpl` — the master-hosted `FleetService`, handling the
//! three agent-initiated RPCs: registration, heartbeat, event reporting.
//! Spec.md §4.4/§4.7.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::domain::errors::DomainError;
use crate::domain::models::EventType;
use crate::domain::ports::{AgentRepository, EventQueue};

use super::generated::fleet_service_server::FleetService;
use super::generated::{
    HeartbeatReply, HeartbeatRequest, RegisterAgentReply, RegisterAgentRequest, ReportEventReply,
    ReportEventRequest,
};

pub struct FleetServiceImpl {
    agents: Arc<dyn AgentRepository>,
    events: Arc<dyn EventQueue>,
}

impl FleetServiceImpl {
    #[must_use]
    pub fn new(agents: Arc<dyn AgentRepository>, events: Arc<dyn EventQueue>) -> Self {
        Self { agents, events }
    }
}

#[tonic::async_trait]
impl FleetService for FleetServiceImpl {
    async fn register_agent(
        &self,
        request: Request<RegisterAgentRequest>,
    ) -> Result<Response<RegisterAgentReply>, Status> {
        let req = request.into_inner();
        self.agents
            .upsert(&req.name, &req.address, &req.agent_version)
            .await
            .map_err(status_from_domain)?;
        tracing::info!(agent = %req.name, address = %req.address, "agent registered");
        Ok(Response::new(RegisterAgentReply {}))
    }

    async fn heartbeat(&self, request: Request<HeartbeatRequest>) -> Result<Response<HeartbeatReply>, Status> {
        let req = request.into_inner();
        self.agents.heartbeat(&req.name).await.map_err(status_from_domain)?;
        Ok(Response::new(HeartbeatReply {}))
    }

    async fn report_event(
        &self,
        request: Request<ReportEventRequest>,
    ) -> Result<Response<ReportEventReply>, Status> {
        let req = request.into_inner();
        let payload: serde_json::Value =
            serde_json::from_str(&req.payload_json).unwrap_or(serde_json::Value::Null);
        let event_type = EventType::parse_str(&req.event_type);
        let event = self
            .events
            .enqueue(event_type, &req.agent, payload)
            .await
            .map_err(status_from_domain)?;
        Ok(Response::new(ReportEventReply {
            event_id: event.id.to_string(),
        }))
    }
}

/// The reverse direction of `DomainError`'s `From<tonic::Status>`: maps a
/// server-side domain failure back onto a wire status.
fn status_from_domain(err: DomainError) -> Status {
    match err {
        DomainError::NotFound(m) => Status::not_found(m),
        DomainError::AlreadyExists(m) => Status::already_exists(m),
        DomainError::Validation(m) => Status::invalid_argument(m),
        DomainError::Transient(m) => Status::unavailable(m),
        DomainError::CircuitOpen { name, .. } => Status::unavailable(format!("circuit '{name}' open")),
        DomainError::Timeout(d) => Status::deadline_exceeded(format!("{d:?}")),
        DomainError::Cancelled => Status::cancelled("operation cancelled"),
        DomainError::Fatal(m) => Status::internal(m),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteAgentRepository, SqliteEventRepository};

    async fn service() -> FleetServiceImpl {
        let pool = create_migrated_test_pool().await.unwrap();
        FleetServiceImpl::new(
            Arc::new(SqliteAgentRepository::new(pool.clone())),
            Arc::new(SqliteEventRepository::new(pool)),
        )
    }

    #[tokio::test]
    async fn register_then_heartbeat_succeeds() {
        let svc = service().await;
        svc.register_agent(Request::new(RegisterAgentRequest {
            name: "agent-1".to_string(),
            address: "10.0.0.5:9000".to_string(),
            agent_version: "1.0.0".to_string(),
        }))
        .await
        .unwrap();

        let response = svc
            .heartbeat(Request::new(HeartbeatRequest {
                name: "agent-1".to_string(),
            }))
            .await;
        assert!(response.is_ok());
    }

    #[tokio::test]
    async fn heartbeat_for_unknown_agent_is_not_found() {
        let svc = service().await;
        let status = svc
            .heartbeat(Request::new(HeartbeatRequest {
                name: "ghost".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn report_event_returns_generated_event_id() {
        let svc = service().await;
        let response = svc
            .report_event(Request::new(ReportEventRequest {
                event_type: "cpu_high".to_string(),
                agent: "agent-1".to_string(),
                payload_json: "{\"cpu\":97}".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(uuid::Uuid::parse_str(&response.event_id).is_ok());
    }
}
