//! Registration types shared by the adapter, the server and the
//! configuration generator

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::admissionregistration::v1::RuleWithOperations;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use super::server::WebhookServer;
use crate::manager::cluster::Cluster;
use crate::manager::options::{FailurePolicy, ManagerOptions};

/// Pods carrying this label value are treated as apps by the app filter
pub const APP_LABEL: &str = "source_type";
pub const APP_LABEL_VALUE: &str = "APP";

/// Per-adapter registration parameters
pub struct WebhookOptions<'a> {
    /// Unique id of the adapter, the registration index
    pub id: String,

    /// Cluster connection the adapter is registered against
    pub cluster: Option<Arc<dyn Cluster>>,

    /// Server the adapter's path is mounted on
    pub server: Option<&'a WebhookServer>,

    pub manager_options: &'a ManagerOptions,
}

impl WebhookOptions<'_> {
    /// HTTP path of the adapter
    pub fn path(&self) -> String {
        format!("/{}-{}", self.manager_options.operator_fingerprint, self.id)
    }

    /// Fully qualified webhook name, as required by the API server
    pub fn name(&self) -> String {
        format!(
            "{}-{}.{}.mutating-hook",
            self.manager_options.operator_fingerprint, self.id, self.manager_options.namespace
        )
    }
}

/// A registered admission webhook: one entry of the MutatingWebhookConfiguration
#[derive(Clone, Debug, PartialEq)]
pub struct AdmissionWebhook {
    pub id: String,
    pub name: String,
    pub path: String,
    pub rules: Vec<RuleWithOperations>,
    pub failure_policy: FailurePolicy,
    pub namespace_selector: Option<LabelSelector>,
    pub object_selector: Option<LabelSelector>,
}

impl AdmissionWebhook {
    /// Entry for a Pod mutating adapter registered with `options`
    pub fn for_pods(options: &WebhookOptions<'_>) -> Self {
        let manager_options = options.manager_options;

        let mut operations = vec!["CREATE".to_string()];
        if manager_options.register_update {
            operations.push("UPDATE".to_string());
        }

        let (namespace_selector, object_selector) = if manager_options.filter_apps {
            (
                Some(match_labels(
                    &manager_options.namespace_label(),
                    &manager_options.namespace,
                )),
                Some(match_labels(APP_LABEL, APP_LABEL_VALUE)),
            )
        } else {
            (None, None)
        };

        Self {
            id: options.id.clone(),
            name: options.name(),
            path: options.path(),
            rules: vec![RuleWithOperations {
                api_groups: Some(vec!["".to_string()]),
                api_versions: Some(vec!["v1".to_string()]),
                operations: Some(operations),
                resources: Some(vec!["pods".to_string()]),
                scope: Some("Namespaced".to_string()),
            }],
            failure_policy: manager_options.failure_policy,
            namespace_selector,
            object_selector,
        }
    }
}

fn match_labels(key: &str, value: &str) -> LabelSelector {
    LabelSelector {
        match_expressions: None,
        match_labels: Some(BTreeMap::from([(key.to_string(), value.to_string())])),
    }
}
