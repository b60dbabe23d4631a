//! Environment injection
//!
//! Adds a fixed set of environment variables to every container of the Pod.
//! Variables the container already defines are left alone.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use kube::core::DynamicObject;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::extension::{Extension, Manager};

/// Injects environment variables into every container
#[derive(Clone, Debug, Default)]
pub struct EnvInjector {
    vars: BTreeMap<String, String>,
}

impl EnvInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable to inject
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// JSON patch operations adding the missing variables, empty when nothing is missing
    pub fn patches(&self, pod: &Pod) -> Vec<Value> {
        let mut patches = Vec::new();
        let Some(spec) = &pod.spec else {
            return patches;
        };

        for (index, container) in spec.containers.iter().enumerate() {
            let env = container.env.as_deref().unwrap_or_default();
            let missing: Vec<Value> = self
                .vars
                .iter()
                .filter(|(name, _)| !env.iter().any(|var| &var.name == *name))
                .map(|(name, value)| json!({ "name": name, "value": value }))
                .collect();

            if missing.is_empty() {
                continue;
            }

            if container.env.is_none() {
                patches.push(json!({
                    "op": "add",
                    "path": format!("/spec/containers/{index}/env"),
                    "value": missing
                }));
            } else {
                patches.extend(missing.into_iter().map(|var| {
                    json!({
                        "op": "add",
                        "path": format!("/spec/containers/{index}/env/-"),
                        "value": var
                    })
                }));
            }

            debug!(container = %container.name, "Injecting environment");
        }

        patches
    }
}

#[async_trait]
impl Extension for EnvInjector {
    fn name(&self) -> &str {
        "env-injector"
    }

    async fn handle(
        &self,
        _manager: &dyn Manager,
        pod: Option<&Pod>,
        request: &AdmissionRequest<DynamicObject>,
    ) -> anyhow::Result<AdmissionResponse> {
        let response = AdmissionResponse::from(request);
        let Some(pod) = pod else {
            return Ok(response);
        };

        let patches = self.patches(pod);
        if patches.is_empty() {
            return Ok(response);
        }

        info!(
            pod = ?pod.metadata.name,
            operations = patches.len(),
            "Injecting environment variables"
        );
        let patch: json_patch::Patch = serde_json::from_value(Value::Array(patches))?;
        Ok(response.with_patch(patch)?)
    }
}
