//! Webhook delivery client — spec.md §4.9's "perform an HTTP POST with the
//! event payload and configured headers + secret".

pub mod client;

pub use client::{WebhookClient, WebhookDeliveryOutcome};
