//! Webhook Module
//!
//! Turns extensions into mutating admission webhooks and serves them.
//!
//! - **Adapter**: wraps one extension, decodes the Pod and shapes the response
//! - **Server**: TLS listener with one path per adapter
//! - **Types**: registration parameters and the resulting webhook entries

pub mod adapter;
pub mod server;
pub mod types;

pub use adapter::Webhook;
pub use server::{HealthResponse, WebhookServer};
pub use types::{AdmissionWebhook, WebhookOptions, APP_LABEL, APP_LABEL_VALUE};
