//! fleetd — a distributed task-runner control plane.
//!
//! Agents register, heartbeat, and report events over gRPC; the daemon
//! tracks fleet membership, polls and stores telemetry, dispatches events to
//! hook scripts, and orchestrates named agent groups (hierarchy, templates,
//! auto-discovery, bulk operations, webhook notification). Every outbound
//! call to an agent goes through a per-agent circuit breaker and a shared
//! connection pool.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod grpc;
pub mod infrastructure;
pub mod reliability;
pub mod services;
