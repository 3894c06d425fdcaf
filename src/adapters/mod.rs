//! Concrete adapters implementing the domain ports: SQLite persistence and
//! the outbound webhook HTTP client.

pub mod sqlite;
pub mod webhook;
