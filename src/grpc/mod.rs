//! Agent-facing gRPC surface — spec.md §6. The daemon exposes only this
//! surface plus the internal long-lived loops in `services`; there is no
//! HTTP/REST layer.

pub mod client;
pub mod generated;
pub mod server;

pub use client::{AgentClient, AgentClientDialer};
pub use server::FleetServiceImpl;
