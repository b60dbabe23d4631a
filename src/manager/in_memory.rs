//! In-process cluster
//!
//! Keeps namespaces, secrets and webhook configurations in memory and answers
//! with the same 404/409 errors an API server would. Used by the test suite
//! and by extension authors exercising their extensions without a cluster.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use k8s_openapi::api::admissionregistration::v1::MutatingWebhookConfiguration;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::error::ErrorResponse;

use super::cluster::{Cluster, Connector};
use super::options::ManagerOptions;
use crate::error::Result;

#[derive(Default)]
struct State {
    namespaces: BTreeMap<String, Namespace>,
    secrets: BTreeMap<(String, String), Secret>,
    webhook_configurations: BTreeMap<String, MutatingWebhookConfiguration>,
    resource_version: u64,
    namespace_writes: usize,
    secret_writes: usize,
}

impl State {
    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }
}

/// A [`Cluster`] holding its objects in memory
#[derive(Default)]
pub struct InMemoryCluster {
    state: Mutex<State>,
}

fn api_error(code: u16, reason: &str, message: String) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    })
}

fn not_found(kind: &str, name: &str) -> kube::Error {
    api_error(404, "NotFound", format!("{kind} \"{name}\" not found"))
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an empty namespace
    pub fn with_namespace(self, name: &str) -> Self {
        {
            let mut state = self.lock();
            let version = state.next_version();
            state.namespaces.insert(
                name.to_string(),
                Namespace {
                    metadata: ObjectMeta {
                        name: Some(name.to_string()),
                        resource_version: Some(version),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            );
        }
        self
    }

    /// Seed a secret
    pub fn with_secret(self, secret: Secret) -> Self {
        {
            let mut state = self.lock();
            let key = (
                secret.metadata.namespace.clone().unwrap_or_default(),
                secret.metadata.name.clone().unwrap_or_default(),
            );
            state.secrets.insert(key, secret);
        }
        self
    }

    /// Seed a webhook configuration
    pub fn with_webhook_configuration(self, config: MutatingWebhookConfiguration) -> Self {
        {
            let mut state = self.lock();
            let version = state.next_version();
            let mut config = config;
            config.metadata.resource_version = Some(version);
            let name = config.metadata.name.clone().unwrap_or_default();
            state.webhook_configurations.insert(name, config);
        }
        self
    }

    pub fn namespace(&self, name: &str) -> Option<Namespace> {
        self.lock().namespaces.get(name).cloned()
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.lock()
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn webhook_configuration(&self, name: &str) -> Option<MutatingWebhookConfiguration> {
        self.lock().webhook_configurations.get(name).cloned()
    }

    /// Number of namespace replace calls served
    pub fn namespace_writes(&self) -> usize {
        self.lock().namespace_writes
    }

    /// Number of secret apply calls served
    pub fn secret_writes(&self) -> usize {
        self.lock().secret_writes
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Cluster for InMemoryCluster {
    async fn get_namespace(&self, name: &str) -> kube::Result<Namespace> {
        self.lock()
            .namespaces
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("namespaces", name))
    }

    async fn replace_namespace(&self, namespace: &Namespace) -> kube::Result<Namespace> {
        let name = namespace.metadata.name.clone().unwrap_or_default();
        let mut state = self.lock();
        let current = state
            .namespaces
            .get(&name)
            .ok_or_else(|| not_found("namespaces", &name))?;
        if current.metadata.resource_version != namespace.metadata.resource_version {
            return Err(api_error(
                409,
                "Conflict",
                format!("namespace \"{name}\" was modified"),
            ));
        }
        let mut stored = namespace.clone();
        stored.metadata.resource_version = Some(state.next_version());
        state.namespace_writes += 1;
        state.namespaces.insert(name, stored.clone());
        Ok(stored)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> kube::Result<Option<Secret>> {
        Ok(self.secret(namespace, name))
    }

    async fn apply_secret(&self, secret: &Secret, _field_manager: &str) -> kube::Result<Secret> {
        let key = (
            secret.metadata.namespace.clone().unwrap_or_default(),
            secret.metadata.name.clone().unwrap_or_default(),
        );
        let mut state = self.lock();
        let mut stored = secret.clone();
        stored.metadata.resource_version = Some(state.next_version());
        state.secret_writes += 1;
        state.secrets.insert(key, stored.clone());
        Ok(stored)
    }

    async fn get_mutating_webhook_configuration(
        &self,
        name: &str,
    ) -> kube::Result<Option<MutatingWebhookConfiguration>> {
        Ok(self.webhook_configuration(name))
    }

    async fn create_mutating_webhook_configuration(
        &self,
        config: &MutatingWebhookConfiguration,
    ) -> kube::Result<MutatingWebhookConfiguration> {
        let name = config.metadata.name.clone().unwrap_or_default();
        let mut state = self.lock();
        if state.webhook_configurations.contains_key(&name) {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("mutatingwebhookconfigurations \"{name}\" already exists"),
            ));
        }
        let mut stored = config.clone();
        stored.metadata.resource_version = Some(state.next_version());
        state.webhook_configurations.insert(name, stored.clone());
        Ok(stored)
    }

    async fn replace_mutating_webhook_configuration(
        &self,
        config: &MutatingWebhookConfiguration,
    ) -> kube::Result<MutatingWebhookConfiguration> {
        let name = config.metadata.name.clone().unwrap_or_default();
        let mut state = self.lock();
        if !state.webhook_configurations.contains_key(&name) {
            return Err(not_found("mutatingwebhookconfigurations", &name));
        }
        let mut stored = config.clone();
        stored.metadata.resource_version = Some(state.next_version());
        state.webhook_configurations.insert(name, stored.clone());
        Ok(stored)
    }
}

/// Hands out the same cluster on every connect, counting the calls
pub struct StaticConnector {
    cluster: Arc<dyn Cluster>,
    connects: AtomicUsize,
}

impl StaticConnector {
    pub fn new(cluster: Arc<dyn Cluster>) -> Self {
        Self {
            cluster,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for StaticConnector {
    async fn connect(&self, _options: &ManagerOptions) -> Result<Arc<dyn Cluster>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.cluster))
    }
}
