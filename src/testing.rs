//! Test doubles shared by unit tests

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use kube::core::DynamicObject;

use crate::extension::{Extension, Manager};

/// Admits everything unchanged under a fixed name
pub(crate) struct NamedExtension {
    name: String,
}

impl NamedExtension {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Extension for NamedExtension {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        _manager: &dyn Manager,
        _pod: Option<&Pod>,
        request: &AdmissionRequest<DynamicObject>,
    ) -> anyhow::Result<AdmissionResponse> {
        Ok(AdmissionResponse::from(request))
    }
}
