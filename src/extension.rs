//! Extension contract
//!
//! An extension is a single admission handler for Pods. It receives the Pod
//! decoded from the admission request and returns the admission response,
//! typically carrying a JSON patch that moves the Pod towards the state the
//! extension wants. Extensions never deal with TLS, HTTP routing or the
//! `MutatingWebhookConfiguration`: the manager owns all of that.
//!
//! # Example
//!
//! ```rust,ignore
//! use pod_extensions::{Extension, ExtensionManager, Manager, ManagerOptions};
//!
//! struct Annotator;
//!
//! #[async_trait::async_trait]
//! impl Extension for Annotator {
//!     fn name(&self) -> &str {
//!         "annotator"
//!     }
//!
//!     async fn handle(
//!         &self,
//!         _manager: &dyn Manager,
//!         pod: Option<&Pod>,
//!         request: &AdmissionRequest<DynamicObject>,
//!     ) -> anyhow::Result<AdmissionResponse> {
//!         let patch = serde_json::from_value(json!([
//!             { "op": "add", "path": "/metadata/annotations/seen", "value": "true" }
//!         ]))?;
//!         Ok(AdmissionResponse::from(request).with_patch(patch)?)
//!     }
//! }
//!
//! let mut manager = ExtensionManager::new(ManagerOptions::default());
//! manager.add_extension(Annotator);
//! manager.start().await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use kube::core::DynamicObject;

use crate::manager::cluster::Cluster;
use crate::manager::options::ManagerOptions;

/// Audit annotation naming the extension that produced the decision
pub const EXTENSION_NAME_ANNOTATION: &str = "name";

/// Audit annotation carrying the reason of a denial produced by the adapter
pub const ERROR_ANNOTATION: &str = "error";

/// A Pod mutating extension
#[async_trait]
pub trait Extension: Send + Sync {
    /// Name reported in the `name` audit annotation of every response
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Handle an admission request for a Pod.
    ///
    /// `pod` is `None` when the request carries no object (DELETE, CONNECT).
    /// Returning an error denies the request; the error text ends up in the
    /// `error` audit annotation.
    async fn handle(
        &self,
        manager: &dyn Manager,
        pod: Option<&Pod>,
        request: &AdmissionRequest<DynamicObject>,
    ) -> anyhow::Result<AdmissionResponse>;
}

#[async_trait]
impl<E: Extension + ?Sized> Extension for Arc<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn handle(
        &self,
        manager: &dyn Manager,
        pod: Option<&Pod>,
        request: &AdmissionRequest<DynamicObject>,
    ) -> anyhow::Result<AdmissionResponse> {
        (**self).handle(manager, pod, request).await
    }
}

/// Read-only view of the manager handed to extensions while serving
pub trait Manager: Send + Sync {
    /// Registered extensions, in registration order
    fn list_extensions(&self) -> &[Arc<dyn Extension>];

    /// The cluster connection, once established
    fn kube_connection(&self) -> Option<Arc<dyn Cluster>>;

    /// Options the manager was built with, defaults applied
    fn options(&self) -> &ManagerOptions;

    /// Span carrying the manager's fingerprint and namespace
    fn logger(&self) -> &tracing::Span;
}
