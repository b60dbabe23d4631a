//! Cluster access
//!
//! The manager only needs a handful of API calls. They sit behind the
//! [`Cluster`] trait so that the startup sequence can run against a real API
//! server ([`KubeCluster`]) or an in-process one
//! ([`InMemoryCluster`](super::in_memory::InMemoryCluster)).

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::admissionregistration::v1::MutatingWebhookConfiguration;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::{debug, info};

use super::options::ManagerOptions;
use crate::error::{Error, Result};

/// The cluster API calls the manager performs
#[async_trait]
pub trait Cluster: Send + Sync {
    async fn get_namespace(&self, name: &str) -> kube::Result<Namespace>;

    async fn replace_namespace(&self, namespace: &Namespace) -> kube::Result<Namespace>;

    async fn get_secret(&self, namespace: &str, name: &str) -> kube::Result<Option<Secret>>;

    /// Server-side apply of a secret, taking ownership of conflicting fields
    async fn apply_secret(&self, secret: &Secret, field_manager: &str) -> kube::Result<Secret>;

    async fn get_mutating_webhook_configuration(
        &self,
        name: &str,
    ) -> kube::Result<Option<MutatingWebhookConfiguration>>;

    async fn create_mutating_webhook_configuration(
        &self,
        config: &MutatingWebhookConfiguration,
    ) -> kube::Result<MutatingWebhookConfiguration>;

    async fn replace_mutating_webhook_configuration(
        &self,
        config: &MutatingWebhookConfiguration,
    ) -> kube::Result<MutatingWebhookConfiguration>;

    /// Underlying client for extensions that need more than the calls above
    fn client(&self) -> Option<Client> {
        None
    }
}

/// Establishes the cluster connection for a manager
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, options: &ManagerOptions) -> Result<Arc<dyn Cluster>>;
}

#[async_trait]
impl<C: Connector + ?Sized> Connector for Arc<C> {
    async fn connect(&self, options: &ManagerOptions) -> Result<Arc<dyn Cluster>> {
        (**self).connect(options).await
    }
}

/// [`Cluster`] backed by a `kube::Client`
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn get_namespace(&self, name: &str) -> kube::Result<Namespace> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.get(name).await
    }

    async fn replace_namespace(&self, namespace: &Namespace) -> kube::Result<Namespace> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let name = namespace.metadata.name.clone().unwrap_or_default();
        api.replace(&name, &PostParams::default(), namespace).await
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> kube::Result<Option<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await
    }

    async fn apply_secret(&self, secret: &Secret, field_manager: &str) -> kube::Result<Secret> {
        let namespace = secret.metadata.namespace.clone().unwrap_or_default();
        let name = secret.metadata.name.clone().unwrap_or_default();
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        api.patch(
            &name,
            &PatchParams::apply(field_manager).force(),
            &Patch::Apply(secret),
        )
        .await
    }

    async fn get_mutating_webhook_configuration(
        &self,
        name: &str,
    ) -> kube::Result<Option<MutatingWebhookConfiguration>> {
        let api: Api<MutatingWebhookConfiguration> = Api::all(self.client.clone());
        api.get_opt(name).await
    }

    async fn create_mutating_webhook_configuration(
        &self,
        config: &MutatingWebhookConfiguration,
    ) -> kube::Result<MutatingWebhookConfiguration> {
        let api: Api<MutatingWebhookConfiguration> = Api::all(self.client.clone());
        api.create(&PostParams::default(), config).await
    }

    async fn replace_mutating_webhook_configuration(
        &self,
        config: &MutatingWebhookConfiguration,
    ) -> kube::Result<MutatingWebhookConfiguration> {
        let api: Api<MutatingWebhookConfiguration> = Api::all(self.client.clone());
        let name = config.metadata.name.clone().unwrap_or_default();
        api.replace(&name, &PostParams::default(), config).await
    }

    fn client(&self) -> Option<Client> {
        Some(self.client.clone())
    }
}

/// Connects with the configured kubeconfig, or the inferred in-cluster config
#[derive(Clone, Copy, Debug, Default)]
pub struct KubeConnector;

#[async_trait]
impl Connector for KubeConnector {
    async fn connect(&self, options: &ManagerOptions) -> Result<Arc<dyn Cluster>> {
        let config = match &options.kube_config {
            Some(path) => {
                debug!(path = %path.display(), "Loading kubeconfig");
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    Error::Connection(format!("reading kubeconfig {}: {e}", path.display()))
                })?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| Error::Connection(format!("loading kubeconfig: {e}")))?
            }
            None => Config::infer()
                .await
                .map_err(|e| Error::Connection(format!("inferring cluster config: {e}")))?,
        };

        let client = Client::try_from(config)
            .map_err(|e| Error::Connection(format!("building client: {e}")))?;

        let version = client
            .apiserver_version()
            .await
            .map_err(|e| Error::Connection(format!("checking API server: {e}")))?;
        info!(
            version = %version.git_version,
            "Connected to Kubernetes cluster"
        );

        Ok(Arc::new(KubeCluster::new(client)))
    }
}
