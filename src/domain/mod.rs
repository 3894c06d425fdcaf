//! Domain layer for the fleet control plane.
//!
//! Contains framework-agnostic models, the `DomainError` taxonomy, and the
//! port traits implemented by `adapters::sqlite`.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
