//! Per-extension admission adapter
//!
//! A [`Webhook`] turns an [`Extension`] into a mutating admission webhook:
//! it decodes the Pod, applies the app filter, delegates to the extension and
//! makes sure every response names the extension that produced it. Failures
//! stay inside the response; nothing here can take the serving loop down.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use kube::core::DynamicObject;
use tracing::{debug, info, instrument, warn};

use super::types::{AdmissionWebhook, WebhookOptions, APP_LABEL, APP_LABEL_VALUE};
use crate::error::{Error, Result};
use crate::extension::{Extension, Manager, ERROR_ANNOTATION, EXTENSION_NAME_ANNOTATION};

/// Mutating webhook generated from an extension
pub struct Webhook {
    extension: Arc<dyn Extension>,
    manager: Arc<dyn Manager>,
}

impl Webhook {
    pub fn new(extension: Arc<dyn Extension>, manager: Arc<dyn Manager>) -> Self {
        Self { extension, manager }
    }

    /// Name of the wrapped extension
    pub fn name(&self) -> &str {
        self.extension.name()
    }

    /// Answer an admission request on behalf of the extension
    #[instrument(skip_all, fields(extension = %self.extension.name(), uid = %request.uid))]
    pub async fn handle(&self, request: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
        let mut response = match decode_pod(request) {
            Err(e) => {
                warn!(error = %e, "Denying admission request without a decodable Pod");
                deny(request, e.to_string())
            }
            Ok(Some(pod)) if self.manager.options().filter_apps && !is_app(&pod) => {
                debug!(pod = ?pod.metadata.name, "Pod is not an app, admitting unchanged");
                AdmissionResponse::from(request)
            }
            Ok(pod) => {
                match self
                    .extension
                    .handle(self.manager.as_ref(), pod.as_ref(), request)
                    .await
                {
                    Ok(response) => response,
                    Err(e) => {
                        warn!(error = %e, "Extension failed, denying admission request");
                        deny(request, format!("{e:#}"))
                    }
                }
            }
        };

        response.audit_annotations.insert(
            EXTENSION_NAME_ANNOTATION.to_string(),
            self.extension.name().to_string(),
        );
        response
    }

    /// Mount the webhook on the server and describe it for the cluster configuration
    pub async fn register_admission_webhook(
        self: Arc<Self>,
        options: WebhookOptions<'_>,
    ) -> Result<AdmissionWebhook> {
        let server = options.server.ok_or_else(|| {
            Error::Registration(format!(
                "webhook {} ({}) has no server to register with",
                options.id,
                self.name()
            ))
        })?;
        if options.cluster.is_none() {
            return Err(Error::Registration(format!(
                "webhook {} ({}) has no cluster connection",
                options.id,
                self.name()
            )));
        }

        let hook = AdmissionWebhook::for_pods(&options);
        let extension = self.name().to_string();
        server.register(&hook.path, self).await?;

        info!(
            id = %hook.id,
            path = %hook.path,
            extension = %extension,
            "Registered admission webhook"
        );
        Ok(hook)
    }
}

/// Pod carried by the request, `None` when the request has no object
fn decode_pod(request: &AdmissionRequest<DynamicObject>) -> Result<Option<Pod>> {
    let Some(object) = &request.object else {
        return Ok(None);
    };
    let value = serde_json::to_value(object)?;
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| Error::Decode(e.to_string()))
}

fn is_app(pod: &Pod) -> bool {
    pod.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(APP_LABEL))
        .is_some_and(|value| value == APP_LABEL_VALUE)
}

fn deny(request: &AdmissionRequest<DynamicObject>, reason: String) -> AdmissionResponse {
    let mut response = AdmissionResponse::from(request).deny(reason.clone());
    response
        .audit_annotations
        .insert(ERROR_ANNOTATION.to_string(), reason);
    response
}
