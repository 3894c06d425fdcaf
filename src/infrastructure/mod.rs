//! Infrastructure layer: ambient concerns shared across subsystems that are
//! not themselves domain ports. SQLite and the webhook HTTP client live
//! under `adapters` since they implement domain ports; `logging` is the
//! only module here because it doesn't.

pub mod logging;
