//! Extension manager
//!
//! [`ExtensionManager`] collects extensions and, on start, turns them into
//! running admission webhooks:
//!
//! 1. connect to the cluster (once, cached),
//! 2. build the webhook server and the configuration scoped to the namespace,
//! 3. make sure a serving certificate exists,
//! 4. label the operator namespace with `<fingerprint>-ns=<namespace>`,
//! 5. register one adapter per extension, ids following registration order,
//! 6. write the MutatingWebhookConfiguration listing every adapter.
//!
//! Any failure aborts the sequence. Nothing is rolled back; every step is
//! idempotent, so starting again converges.

pub mod cluster;
pub mod in_memory;
pub mod options;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, info, info_span, Instrument, Span};

use crate::certificate::{CertificateGenerator, InMemoryGenerator, WebhookConfig};
use crate::error::{Error, Result};
use crate::extension::{Extension, Manager};
use crate::telemetry::FlushGuard;
use crate::webhook::{AdmissionWebhook, Webhook, WebhookOptions, WebhookServer};

use self::cluster::{Cluster, Connector, KubeConnector};
use self::options::ManagerOptions;

/// Registry of extensions and owner of the startup sequence
pub struct ExtensionManager {
    options: ManagerOptions,
    extensions: Vec<Arc<dyn Extension>>,
    connection: OnceCell<Arc<dyn Cluster>>,
    connector: Arc<dyn Connector>,
    generator: Arc<dyn CertificateGenerator>,
    span: Span,
}

impl ExtensionManager {
    /// Manager with derived defaults applied to `options`
    pub fn new(options: ManagerOptions) -> Self {
        let options = options.apply_defaults();
        let span = info_span!(
            "extension_manager",
            fingerprint = %options.operator_fingerprint,
            namespace = %options.namespace
        );
        Self {
            options,
            extensions: Vec::new(),
            connection: OnceCell::new(),
            connector: Arc::new(KubeConnector),
            generator: Arc::new(InMemoryGenerator),
            span,
        }
    }

    /// Replace how the cluster connection is established
    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Replace where certificate material comes from
    pub fn with_credential_generator(
        mut self,
        generator: impl CertificateGenerator + 'static,
    ) -> Self {
        self.generator = Arc::new(generator);
        self
    }

    /// Append an extension; its adapter id is its position in the list
    pub fn add_extension(&mut self, extension: impl Extension + 'static) {
        debug!(parent: &self.span, extension = %extension.name(), "Adding extension");
        self.extensions.push(Arc::new(extension));
    }

    /// The cluster connection, established on first use
    pub async fn get_kube_connection(&self) -> Result<Arc<dyn Cluster>> {
        self.connection
            .get_or_try_init(|| self.connector.connect(&self.options))
            .await
            .map(Arc::clone)
    }

    /// Run the startup sequence and freeze the manager
    pub async fn prepare(self) -> Result<PreparedManager> {
        let span = self.span.clone();
        async move {
            let cluster = self.get_kube_connection().await?;

            let server = WebhookServer::new(&self.options);
            let mut config =
                WebhookConfig::new(Arc::clone(&cluster), &self.options, Arc::clone(&self.generator));

            config.setup_certificate().await?;
            set_operator_namespace_label(cluster.as_ref(), &self.options).await?;

            let manager = Arc::new(self);
            let shared: Arc<dyn Manager> = manager.clone();
            let mut webhooks = Vec::with_capacity(manager.extensions.len());
            for (index, extension) in manager.extensions.iter().enumerate() {
                let hook = Arc::new(Webhook::new(Arc::clone(extension), Arc::clone(&shared)));
                let registered = hook
                    .register_admission_webhook(WebhookOptions {
                        id: index.to_string(),
                        cluster: Some(Arc::clone(&cluster)),
                        server: Some(&server),
                        manager_options: &manager.options,
                    })
                    .await?;
                webhooks.push(registered);
            }

            config.generate_webhook_server_config(&webhooks).await?;
            info!(webhooks = webhooks.len(), "Extension manager prepared");

            Ok(PreparedManager {
                manager,
                server,
                config: Mutex::new(config),
                webhooks,
            })
        }
        .instrument(span)
        .await
    }

    /// Start serving until SIGINT or SIGTERM
    pub async fn start(self) -> Result<()> {
        self.start_with_shutdown(crate::signals::shutdown_signal())
            .await
    }

    /// Start serving until `shutdown` resolves
    pub async fn start_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let _flush = FlushGuard::new();
        let prepared = self.prepare().await?;
        prepared.serve(shutdown).await
    }
}

impl Manager for ExtensionManager {
    fn list_extensions(&self) -> &[Arc<dyn Extension>] {
        &self.extensions
    }

    fn kube_connection(&self) -> Option<Arc<dyn Cluster>> {
        self.connection.get().cloned()
    }

    fn options(&self) -> &ManagerOptions {
        &self.options
    }

    fn logger(&self) -> &Span {
        &self.span
    }
}

/// Label the operator namespace so the webhooks' namespace selector matches it
pub async fn set_operator_namespace_label(
    cluster: &dyn Cluster,
    options: &ManagerOptions,
) -> Result<()> {
    let namespace = &options.namespace;
    let label_error = |source| Error::NamespaceLabel {
        namespace: namespace.clone(),
        source,
    };

    let mut ns = cluster.get_namespace(namespace).await.map_err(label_error)?;

    let key = options.namespace_label();
    let labels = ns.metadata.labels.get_or_insert_with(BTreeMap::new);
    if labels.get(&key) == Some(namespace) {
        debug!(%namespace, label = %key, "Namespace already labelled");
        return Ok(());
    }
    labels.insert(key.clone(), namespace.clone());

    cluster.replace_namespace(&ns).await.map_err(label_error)?;
    info!(%namespace, label = %key, "Labelled operator namespace");
    Ok(())
}

/// A manager that completed its startup sequence and is ready to serve
pub struct PreparedManager {
    manager: Arc<ExtensionManager>,
    server: WebhookServer,
    config: Mutex<WebhookConfig>,
    webhooks: Vec<AdmissionWebhook>,
}

impl PreparedManager {
    pub fn manager(&self) -> &Arc<ExtensionManager> {
        &self.manager
    }

    /// Registered webhooks, in extension order
    pub fn webhooks(&self) -> &[AdmissionWebhook] {
        &self.webhooks
    }

    pub fn server(&self) -> &WebhookServer {
        &self.server
    }

    /// Router serving every registered webhook, without TLS
    pub async fn router(&self) -> Router {
        self.server.router().await
    }

    /// CA bundle the API server uses to trust the webhooks
    pub async fn ca_bundle(&self) -> Option<Vec<u8>> {
        self.config.lock().await.ca_bundle().map(<[u8]>::to_vec)
    }

    /// Re-check the certificate; on rotation reload the listener and re-sync the configuration
    pub async fn rotate_certificate(&self, tls: &RustlsConfig) -> Result<bool> {
        let mut config = self.config.lock().await;
        if !config.setup_certificate().await? {
            return Ok(false);
        }

        tls.reload_from_pem_file(config.cert_path(), config.key_path())
            .await
            .map_err(|e| Error::Server(format!("reloading TLS material: {e}")))?;
        config.generate_webhook_server_config(&self.webhooks).await?;
        info!("TLS server config reloaded with new certificate");
        Ok(true)
    }

    /// Serve until `shutdown` resolves
    pub async fn serve<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let tls = self.server.tls_config().await?;
        let serving = self.server.serve(tls.clone(), shutdown);

        let result = match self.manager.options.cert_check_interval {
            Some(period) => {
                tokio::select! {
                    result = serving => result,
                    _ = self.watch_certificate(period, &tls) => Ok(()),
                }
            }
            None => serving.await,
        };
        if result.is_ok() {
            info!(parent: &self.manager.span, "Webhook server stopped");
        }
        result
    }

    async fn watch_certificate(&self, period: Duration, tls: &RustlsConfig) {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // first tick completes immediately
        loop {
            interval.tick().await;
            if let Err(e) = self.rotate_certificate(tls).await {
                error!(parent: &self.manager.span, "Certificate rotation check failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::in_memory::{InMemoryCluster, StaticConnector};
    use crate::testing::NamedExtension;
    use async_trait::async_trait;

    struct UnreachableConnector;

    #[async_trait]
    impl Connector for UnreachableConnector {
        async fn connect(&self, _options: &ManagerOptions) -> Result<Arc<dyn Cluster>> {
            Err(Error::Connection("connection refused".to_string()))
        }
    }

    fn options(cert_dir: &std::path::Path) -> ManagerOptions {
        ManagerOptions {
            namespace: "eirini".to_string(),
            cert_dir: Some(cert_dir.to_path_buf()),
            ..Default::default()
        }
    }

    #[test]
    fn lists_extensions_in_registration_order() {
        let mut manager = ExtensionManager::new(ManagerOptions::default());
        for name in ["test", "test2", "test3"] {
            manager.add_extension(NamedExtension::new(name));
        }

        let names: Vec<_> = manager.list_extensions().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["test", "test2", "test3"]);
    }

    #[tokio::test]
    async fn prepare_assigns_ids_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = Arc::new(InMemoryCluster::new().with_namespace("eirini"));
        let mut manager = ExtensionManager::new(options(dir.path()))
            .with_connector(StaticConnector::new(cluster.clone()));
        manager.add_extension(NamedExtension::new("a"));
        manager.add_extension(NamedExtension::new("b"));

        let prepared = manager.prepare().await.unwrap();

        let ids: Vec<_> = prepared.webhooks().iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1"]);
        assert_eq!(prepared.server().registered().await, 2);
        assert!(prepared.manager().kube_connection().is_some());
        assert!(prepared.ca_bundle().await.is_some());
    }

    #[tokio::test]
    async fn namespace_labelling_is_idempotent() {
        let cluster = InMemoryCluster::new().with_namespace("eirini");
        let opts = ExtensionManager::new(options(std::path::Path::new("/tmp")))
            .options()
            .clone();

        set_operator_namespace_label(&cluster, &opts).await.unwrap();
        set_operator_namespace_label(&cluster, &opts).await.unwrap();

        let labels = cluster.namespace("eirini").unwrap().metadata.labels.unwrap();
        assert_eq!(labels.get("eirini-x-ns").map(String::as_str), Some("eirini"));
        assert_eq!(cluster.namespace_writes(), 1);
    }

    #[tokio::test]
    async fn labelling_a_missing_namespace_fails() {
        let cluster = InMemoryCluster::new();
        let opts = ManagerOptions {
            namespace: "absent".to_string(),
            ..Default::default()
        };

        let err = set_operator_namespace_label(&cluster, &opts)
            .await
            .unwrap_err();

        match err {
            Error::NamespaceLabel { namespace, source } => {
                assert_eq!(namespace, "absent");
                assert!(matches!(source, kube::Error::Api(ref r) if r.code == 404));
            }
            other => panic!("expected namespace label error, got {other}"),
        }
    }

    #[tokio::test]
    async fn connection_is_established_once() {
        let cluster = Arc::new(InMemoryCluster::new());
        let connector = Arc::new(StaticConnector::new(cluster));
        let manager =
            ExtensionManager::new(ManagerOptions::default()).with_connector(connector.clone());

        assert!(manager.kube_connection().is_none());
        manager.get_kube_connection().await.unwrap();
        manager.get_kube_connection().await.unwrap();

        assert_eq!(connector.connects(), 1);
        assert!(manager.kube_connection().is_some());
    }

    #[tokio::test]
    async fn prepare_fails_without_connection() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager =
            ExtensionManager::new(options(dir.path())).with_connector(UnreachableConnector);
        manager.add_extension(NamedExtension::new("a"));

        assert!(matches!(
            manager.prepare().await,
            Err(Error::Connection(_))
        ));
    }

    #[tokio::test]
    async fn prepare_fails_when_namespace_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = Arc::new(InMemoryCluster::new());
        let manager = ExtensionManager::new(options(dir.path()))
            .with_connector(StaticConnector::new(cluster.clone()));

        assert!(matches!(
            manager.prepare().await,
            Err(Error::NamespaceLabel { .. })
        ));
        // the certificate step ran before labelling
        assert!(cluster.secret("eirini", "eirini-x-setupcertificate").is_some());
    }

    #[tokio::test]
    async fn rotation_reloads_tls_and_resyncs_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = Arc::new(InMemoryCluster::new().with_namespace("eirini"));
        let short_lived = ManagerOptions {
            cert_validity_days: 5,
            cert_rotation_threshold_days: 30,
            cert_check_interval: None,
            ..options(dir.path())
        };
        let mut manager = ExtensionManager::new(short_lived)
            .with_connector(StaticConnector::new(cluster.clone()));
        manager.add_extension(NamedExtension::new("a"));
        let prepared = manager.prepare().await.unwrap();
        let old = prepared.ca_bundle().await.unwrap();
        let tls = prepared.server().tls_config().await.unwrap();

        assert!(prepared.rotate_certificate(&tls).await.unwrap());

        let new = prepared.ca_bundle().await.unwrap();
        assert_ne!(new, old);
        assert_eq!(cluster.secret_writes(), 2);
        let config = cluster
            .webhook_configuration("eirini-x-mutating-hook-eirini")
            .unwrap();
        let webhooks = config.webhooks.unwrap();
        assert_eq!(webhooks.len(), 1);
        assert_eq!(
            webhooks[0].client_config.ca_bundle.as_ref().map(|b| b.0.clone()),
            Some(new)
        );
    }

    #[tokio::test]
    async fn rotation_is_skipped_while_certificate_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = Arc::new(InMemoryCluster::new().with_namespace("eirini"));
        let mut manager = ExtensionManager::new(options(dir.path()))
            .with_connector(StaticConnector::new(cluster.clone()));
        manager.add_extension(NamedExtension::new("a"));
        let prepared = manager.prepare().await.unwrap();
        let before = cluster
            .webhook_configuration("eirini-x-mutating-hook-eirini")
            .unwrap();
        let tls = prepared.server().tls_config().await.unwrap();

        assert!(!prepared.rotate_certificate(&tls).await.unwrap());

        assert_eq!(cluster.secret_writes(), 1);
        let after = cluster
            .webhook_configuration("eirini-x-mutating-hook-eirini")
            .unwrap();
        assert_eq!(
            after.metadata.resource_version,
            before.metadata.resource_version
        );
    }
}
