//! pod-extensions: Pod mutating admission webhooks as plain Rust extensions
//!
//! Implement [`Extension`], add it to an [`ExtensionManager`] and start the
//! manager. The manager provisions the serving certificate, labels the
//! operator namespace, mounts one webhook per extension and keeps the
//! MutatingWebhookConfiguration in sync.

pub mod certificate;
pub mod error;
pub mod extension;
pub mod extensions;
pub mod manager;
pub mod signals;
pub mod telemetry;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::error::{Error, Result};
pub use crate::extension::{Extension, Manager};
pub use crate::manager::cluster::{Cluster, Connector, KubeCluster, KubeConnector};
pub use crate::manager::options::{FailurePolicy, ManagerOptions};
pub use crate::manager::{ExtensionManager, PreparedManager};
