//! Logging infrastructure — spec.md §6 "subsystems accept a context and a
//! logger", realized as `tracing` spans threaded through every service.
//!
//! Structured logging using `tracing` and `tracing-subscriber`: JSON or
//! pretty formatting, optional file rotation via `tracing-appender`, and a
//! secret-scrubbing layer that redacts webhook secrets and agent tokens
//! before they reach a sink.

pub mod config;
pub mod logger;
pub mod rotation;
pub mod secret_scrubbing;

pub use config::{LogConfig, LogFormat, RotationPolicy};
pub use logger::LoggerImpl;
pub use rotation::LogRotator;
