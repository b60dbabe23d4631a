//! Webhook TLS identity and MutatingWebhookConfiguration lifecycle
//!
//! [`WebhookConfig::setup_certificate`] makes sure a valid serving certificate
//! exists (in a Secret, so restarts reuse it, and on disk for the listener)
//! and records the CA bundle. [`WebhookConfig::generate_webhook_server_config`]
//! then writes one webhook entry per registered adapter, embedding that CA
//! bundle, under a name derived from the fingerprint and namespace.
//! Certificate rotation can be re-run on its own without touching adapters.

pub mod credsgen;

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, MutatingWebhookConfiguration, ServiceReference, WebhookClientConfig,
};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use rcgen::KeyPair;
use tracing::{debug, info, instrument, warn};
use x509_parser::extensions::GeneralName;
use x509_parser::pem::parse_x509_pem;

pub use credsgen::{CertificateBundle, CertificateGenerator, CertificateRequest, InMemoryGenerator};

use crate::error::{Error, Result};
use crate::manager::cluster::Cluster;
use crate::manager::options::ManagerOptions;
use crate::webhook::AdmissionWebhook;

pub const TLS_CERT_KEY: &str = "tls.crt";
pub const TLS_KEY_KEY: &str = "tls.key";
pub const CA_CERT_KEY: &str = "ca.crt";

const WEBHOOK_TIMEOUT_SECONDS: i32 = 10;

/// Name of the MutatingWebhookConfiguration for a deployment
pub fn config_name(fingerprint: &str, namespace: &str) -> String {
    format!("{fingerprint}-mutating-hook-{namespace}")
}

/// TLS material and webhook configuration of one manager
pub struct WebhookConfig {
    /// Directory holding `tls.crt`, `tls.key` and `ca.crt` for the listener
    pub cert_dir: PathBuf,

    /// Name of the MutatingWebhookConfiguration
    pub config_name: String,

    /// Name of the Secret holding the certificate
    pub certificate_name: String,

    options: ManagerOptions,
    cluster: Arc<dyn Cluster>,
    generator: Arc<dyn CertificateGenerator>,
    ca_bundle: Option<Vec<u8>>,
}

impl WebhookConfig {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        options: &ManagerOptions,
        generator: Arc<dyn CertificateGenerator>,
    ) -> Self {
        Self {
            cert_dir: options.cert_dir(),
            config_name: options.webhook_config_name(),
            certificate_name: options.setup_certificate_name.clone(),
            options: options.clone(),
            cluster,
            generator,
            ca_bundle: None,
        }
    }

    /// CA bundle recorded by the last successful [`Self::setup_certificate`]
    pub fn ca_bundle(&self) -> Option<&[u8]> {
        self.ca_bundle.as_deref()
    }

    pub fn cert_path(&self) -> PathBuf {
        self.cert_dir.join(TLS_CERT_KEY)
    }

    pub fn key_path(&self) -> PathBuf {
        self.cert_dir.join(TLS_KEY_KEY)
    }

    /// Ensure a valid serving certificate exists and is written to `cert_dir`.
    ///
    /// Returns `true` when new material was issued.
    #[instrument(skip(self), fields(secret = %self.certificate_name))]
    pub async fn setup_certificate(&mut self) -> Result<bool> {
        let namespace = &self.options.namespace;
        let existing = self
            .cluster
            .get_secret(namespace, &self.certificate_name)
            .await
            .map_err(|e| {
                Error::CertificateProvisioning(format!(
                    "reading secret {}/{}: {e}",
                    namespace, self.certificate_name
                ))
            })?;

        let reusable = existing.and_then(|secret| match bundle_from_secret(&secret) {
            Some(bundle) => match self.check_bundle(&bundle) {
                Ok(()) => Some(bundle),
                Err(reason) => {
                    info!(%reason, "Existing webhook certificate is not usable, regenerating");
                    None
                }
            },
            None => {
                warn!("Certificate secret is missing keys, regenerating");
                None
            }
        });

        let (bundle, issued) = match reusable {
            Some(bundle) => {
                debug!("Reusing existing webhook certificate");
                (bundle, false)
            }
            None => {
                let bundle = self
                    .generator
                    .generate_certificate(&self.certificate_request())?;
                self.store_secret(&bundle).await?;
                info!("Generated new webhook certificate");
                (bundle, true)
            }
        };

        write_cert_dir(&self.cert_dir, &bundle).await?;
        self.ca_bundle = Some(bundle.ca_certificate);
        Ok(issued)
    }

    /// Build and create-or-replace the MutatingWebhookConfiguration
    #[instrument(skip(self, webhooks), fields(config = %self.config_name, webhooks = webhooks.len()))]
    pub async fn generate_webhook_server_config(
        &self,
        webhooks: &[AdmissionWebhook],
    ) -> Result<MutatingWebhookConfiguration> {
        let mut desired = self.build_configuration(webhooks)?;

        let sync_error = |source| Error::ConfigurationSync {
            name: self.config_name.clone(),
            source,
        };

        let existing = self
            .cluster
            .get_mutating_webhook_configuration(&self.config_name)
            .await
            .map_err(sync_error)?;

        let applied = match existing {
            Some(current) => {
                let mut metadata = current.metadata;
                let labels = metadata.labels.get_or_insert_with(BTreeMap::new);
                labels.extend(desired.metadata.labels.take().unwrap_or_default());
                desired.metadata = metadata;
                self.cluster
                    .replace_mutating_webhook_configuration(&desired)
                    .await
                    .map_err(sync_error)?
            }
            None => self
                .cluster
                .create_mutating_webhook_configuration(&desired)
                .await
                .map_err(sync_error)?,
        };

        info!("Webhook configuration synced");
        Ok(applied)
    }

    /// The desired MutatingWebhookConfiguration for the given adapters
    pub fn build_configuration(
        &self,
        webhooks: &[AdmissionWebhook],
    ) -> Result<MutatingWebhookConfiguration> {
        let ca_bundle = self.ca_bundle.clone().ok_or_else(|| {
            Error::CertificateProvisioning(
                "no CA bundle recorded, set up the certificate first".to_string(),
            )
        })?;

        let webhooks = webhooks
            .iter()
            .map(|hook| MutatingWebhook {
                name: hook.name.clone(),
                admission_review_versions: vec!["v1".to_string()],
                client_config: self.client_config(&hook.path, &ca_bundle),
                failure_policy: Some(hook.failure_policy.to_string()),
                namespace_selector: hook.namespace_selector.clone(),
                object_selector: hook.object_selector.clone(),
                rules: Some(hook.rules.clone()),
                side_effects: "None".to_string(),
                timeout_seconds: Some(WEBHOOK_TIMEOUT_SECONDS),
                ..Default::default()
            })
            .collect();

        Ok(MutatingWebhookConfiguration {
            metadata: ObjectMeta {
                name: Some(self.config_name.clone()),
                labels: Some(BTreeMap::from([(
                    "app.kubernetes.io/managed-by".to_string(),
                    self.options.operator_fingerprint.clone(),
                )])),
                ..Default::default()
            },
            webhooks: Some(webhooks),
        })
    }

    fn client_config(&self, path: &str, ca_bundle: &[u8]) -> WebhookClientConfig {
        match &self.options.service_name {
            Some(service) => WebhookClientConfig {
                ca_bundle: Some(ByteString(ca_bundle.to_vec())),
                service: Some(ServiceReference {
                    name: service.clone(),
                    namespace: self.options.namespace.clone(),
                    path: Some(path.to_string()),
                    port: Some(i32::from(self.options.port)),
                }),
                url: None,
            },
            None => WebhookClientConfig {
                ca_bundle: Some(ByteString(ca_bundle.to_vec())),
                service: None,
                url: Some(format!(
                    "https://{}:{}{}",
                    url_host(&self.options.host),
                    self.options.port,
                    path
                )),
            },
        }
    }

    fn certificate_request(&self) -> CertificateRequest {
        let mut alternative_names = vec![self.options.host.clone()];
        if let Some(service) = &self.options.service_name {
            let ns = &self.options.namespace;
            alternative_names.extend([
                service.clone(),
                format!("{service}.{ns}"),
                format!("{service}.{ns}.svc"),
                format!("{service}.{ns}.svc.cluster.local"),
            ]);
        }
        CertificateRequest {
            common_name: self.options.operator_fingerprint.clone(),
            alternative_names,
            validity_days: self.options.cert_validity_days,
        }
    }

    /// Why `bundle` cannot serve the current names, if it cannot
    fn check_bundle(&self, bundle: &CertificateBundle) -> std::result::Result<(), String> {
        let key_pem =
            std::str::from_utf8(&bundle.private_key).map_err(|e| format!("private key: {e}"))?;
        let key = KeyPair::from_pem(key_pem).map_err(|e| format!("private key: {e}"))?;

        let (_, ca_pem) =
            parse_x509_pem(&bundle.ca_certificate).map_err(|e| format!("CA certificate: {e}"))?;
        let ca = ca_pem
            .parse_x509()
            .map_err(|e| format!("CA certificate: {e}"))?;

        let (_, pem) =
            parse_x509_pem(&bundle.certificate).map_err(|e| format!("certificate: {e}"))?;
        let cert = pem.parse_x509().map_err(|e| format!("certificate: {e}"))?;

        if key.public_key_raw() != cert.public_key().subject_public_key.data.as_ref() {
            return Err("private key does not match certificate".to_string());
        }
        if cert.issuer() != ca.subject() {
            return Err(format!("issued by {}, not by the CA", cert.issuer()));
        }
        cert.verify_signature(Some(ca.public_key()))
            .map_err(|e| format!("signature does not verify against the CA: {e}"))?;

        let threshold = time::Duration::days(i64::from(self.options.cert_rotation_threshold_days));
        match cert.validity().time_to_expiration() {
            Some(left) if left > threshold => {}
            Some(left) => return Err(format!("expires in {} days", left.whole_days())),
            None => return Err("expired".to_string()),
        }

        let san = cert
            .subject_alternative_name()
            .map_err(|e| format!("subject alternative names: {e}"))?
            .ok_or_else(|| "no subject alternative names".to_string())?;
        let general_names = &san.value.general_names;
        for wanted in self.certificate_request().alternative_names {
            let wanted_ip = wanted.parse::<IpAddr>().ok();
            let covered = general_names.iter().any(|name| match (name, wanted_ip) {
                (GeneralName::IPAddress(bytes), Some(ip)) => ip_matches(ip, bytes),
                (GeneralName::DNSName(dns), None) => dns.eq_ignore_ascii_case(&wanted),
                _ => false,
            });
            if !covered {
                return Err(format!("does not cover {wanted}"));
            }
        }
        Ok(())
    }

    async fn store_secret(&self, bundle: &CertificateBundle) -> Result<()> {
        let data = BTreeMap::from([
            (
                TLS_CERT_KEY.to_string(),
                ByteString(bundle.certificate.clone()),
            ),
            (
                TLS_KEY_KEY.to_string(),
                ByteString(bundle.private_key.clone()),
            ),
            (
                CA_CERT_KEY.to_string(),
                ByteString(bundle.ca_certificate.clone()),
            ),
        ]);
        let fingerprint = &self.options.operator_fingerprint;
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(self.certificate_name.clone()),
                namespace: Some(self.options.namespace.clone()),
                annotations: Some(BTreeMap::from([(
                    format!("{fingerprint}/issued-at"),
                    chrono::Utc::now().to_rfc3339(),
                )])),
                ..Default::default()
            },
            type_: Some("kubernetes.io/tls".to_string()),
            data: Some(data),
            ..Default::default()
        };

        self.cluster
            .apply_secret(&secret, fingerprint)
            .await
            .map_err(|e| {
                Error::CertificateProvisioning(format!(
                    "storing secret {}/{}: {e}",
                    self.options.namespace, self.certificate_name
                ))
            })?;
        Ok(())
    }
}

fn bundle_from_secret(secret: &Secret) -> Option<CertificateBundle> {
    let data = secret.data.as_ref()?;
    Some(CertificateBundle {
        certificate: data.get(TLS_CERT_KEY)?.0.clone(),
        private_key: data.get(TLS_KEY_KEY)?.0.clone(),
        ca_certificate: data.get(CA_CERT_KEY)?.0.clone(),
    })
}

fn ip_matches(ip: IpAddr, bytes: &[u8]) -> bool {
    match ip {
        IpAddr::V4(v4) => bytes == v4.octets(),
        IpAddr::V6(v6) => bytes == v6.octets(),
    }
}

fn url_host(host: &str) -> String {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => format!("[{v6}]"),
        _ => host.to_string(),
    }
}

async fn write_cert_dir(dir: &Path, bundle: &CertificateBundle) -> Result<()> {
    let io_error = |e: std::io::Error| {
        Error::CertificateProvisioning(format!("writing certificates to {}: {e}", dir.display()))
    };
    tokio::fs::create_dir_all(dir).await.map_err(io_error)?;
    tokio::fs::write(dir.join(TLS_CERT_KEY), &bundle.certificate)
        .await
        .map_err(io_error)?;
    tokio::fs::write(dir.join(TLS_KEY_KEY), &bundle.private_key)
        .await
        .map_err(io_error)?;
    tokio::fs::write(dir.join(CA_CERT_KEY), &bundle.ca_certificate)
        .await
        .map_err(io_error)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dir.join(TLS_KEY_KEY), std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(io_error)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::in_memory::InMemoryCluster;
    use crate::manager::options::FailurePolicy;
    use k8s_openapi::api::admissionregistration::v1::RuleWithOperations;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts issued certificates, delegating to the rcgen generator
    #[derive(Default)]
    struct CountingGenerator {
        issued: AtomicUsize,
    }

    impl CertificateGenerator for CountingGenerator {
        fn generate_certificate(&self, request: &CertificateRequest) -> Result<CertificateBundle> {
            self.issued.fetch_add(1, Ordering::SeqCst);
            InMemoryGenerator.generate_certificate(request)
        }
    }

    fn options(dir: &Path) -> ManagerOptions {
        ManagerOptions {
            namespace: "eirini".to_string(),
            host: "10.0.0.5".to_string(),
            port: 4545,
            cert_dir: Some(dir.to_path_buf()),
            ..Default::default()
        }
        .apply_defaults()
    }

    fn hook(id: &str) -> AdmissionWebhook {
        AdmissionWebhook {
            id: id.to_string(),
            name: format!("eirini-x-{id}.eirini.mutating-hook"),
            path: format!("/eirini-x-{id}"),
            rules: vec![RuleWithOperations {
                api_groups: Some(vec!["".to_string()]),
                api_versions: Some(vec!["v1".to_string()]),
                operations: Some(vec!["CREATE".to_string()]),
                resources: Some(vec!["pods".to_string()]),
                scope: None,
            }],
            failure_policy: FailurePolicy::Ignore,
            namespace_selector: None,
            object_selector: None,
        }
    }

    #[test]
    fn config_name_is_deterministic() {
        assert_eq!(config_name("eirini-x", "eirini"), "eirini-x-mutating-hook-eirini");
        assert_eq!(config_name("eirini-x", "eirini"), config_name("eirini-x", "eirini"));
        assert_ne!(config_name("eirini-x", "eirini"), config_name("other", "eirini"));
        assert_ne!(config_name("eirini-x", "eirini"), config_name("eirini-x", "default"));
    }

    #[tokio::test]
    async fn setup_certificate_generates_then_reuses() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = Arc::new(InMemoryCluster::new());
        let generator = Arc::new(CountingGenerator::default());
        let opts = options(dir.path());

        let mut config = WebhookConfig::new(cluster.clone(), &opts, generator.clone());
        assert!(config.setup_certificate().await.unwrap());
        assert!(config.ca_bundle().is_some());
        assert!(config.cert_path().exists());
        assert!(config.key_path().exists());
        let secret = cluster
            .secret("eirini", "eirini-x-setupcertificate")
            .expect("certificate secret stored");
        assert_eq!(secret.type_.as_deref(), Some("kubernetes.io/tls"));

        let mut restarted = WebhookConfig::new(cluster.clone(), &opts, generator.clone());
        assert!(!restarted.setup_certificate().await.unwrap());
        assert_eq!(generator.issued.load(Ordering::SeqCst), 1);
        assert_eq!(restarted.ca_bundle(), config.ca_bundle());
    }

    #[tokio::test]
    async fn certificate_for_another_host_is_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = Arc::new(InMemoryCluster::new());
        let generator = Arc::new(CountingGenerator::default());

        let mut first = WebhookConfig::new(cluster.clone(), &options(dir.path()), generator.clone());
        first.setup_certificate().await.unwrap();

        let moved = ManagerOptions {
            host: "webhook.example.com".to_string(),
            ..options(dir.path())
        };
        let mut second = WebhookConfig::new(cluster.clone(), &moved, generator.clone());
        assert!(second.setup_certificate().await.unwrap());
        assert_eq!(generator.issued.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn certificate_inside_rotation_window_is_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = Arc::new(InMemoryCluster::new());
        let generator = Arc::new(CountingGenerator::default());
        let short_lived = ManagerOptions {
            cert_validity_days: 5,
            cert_rotation_threshold_days: 30,
            ..options(dir.path())
        };

        let mut config = WebhookConfig::new(cluster.clone(), &short_lived, generator.clone());
        assert!(config.setup_certificate().await.unwrap());
        assert!(config.setup_certificate().await.unwrap());
        assert_eq!(generator.issued.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn certificate_for_a_previous_service_is_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = Arc::new(InMemoryCluster::new());
        let generator = Arc::new(CountingGenerator::default());
        let service = |name: &str| ManagerOptions {
            service_name: Some(name.to_string()),
            ..options(dir.path())
        };

        let mut first = WebhookConfig::new(cluster.clone(), &service("old-svc"), generator.clone());
        assert!(first.setup_certificate().await.unwrap());

        let mut renamed = WebhookConfig::new(cluster.clone(), &service("new-svc"), generator.clone());
        assert!(renamed.setup_certificate().await.unwrap());
        assert_eq!(generator.issued.load(Ordering::SeqCst), 2);

        let pem = std::fs::read(renamed.cert_path()).unwrap();
        let (_, pem) = parse_x509_pem(&pem).unwrap();
        let cert = pem.parse_x509().unwrap();
        let san = cert.subject_alternative_name().unwrap().unwrap();
        assert!(san
            .value
            .general_names
            .iter()
            .any(|name| matches!(name, GeneralName::DNSName("new-svc.eirini.svc"))));

        let mut restarted =
            WebhookConfig::new(cluster.clone(), &service("new-svc"), generator.clone());
        assert!(!restarted.setup_certificate().await.unwrap());
    }

    fn tls_secret(bundle: &CertificateBundle) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("eirini-x-setupcertificate".to_string()),
                namespace: Some("eirini".to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([
                (TLS_CERT_KEY.to_string(), ByteString(bundle.certificate.clone())),
                (TLS_KEY_KEY.to_string(), ByteString(bundle.private_key.clone())),
                (CA_CERT_KEY.to_string(), ByteString(bundle.ca_certificate.clone())),
            ])),
            ..Default::default()
        }
    }

    /// Two independently issued bundles for the names `options` asks for
    fn two_bundles(opts: &ManagerOptions) -> (CertificateBundle, CertificateBundle) {
        let config =
            WebhookConfig::new(Arc::new(InMemoryCluster::new()), opts, Arc::new(InMemoryGenerator));
        let request = config.certificate_request();
        let a = InMemoryGenerator.generate_certificate(&request).unwrap();
        let b = InMemoryGenerator.generate_certificate(&request).unwrap();
        assert!(config.check_bundle(&a).is_ok());
        (a, b)
    }

    #[tokio::test]
    async fn key_not_matching_certificate_is_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path());
        let (a, b) = two_bundles(&opts);
        let mixed = CertificateBundle {
            private_key: b.private_key,
            ..a
        };
        let cluster = Arc::new(InMemoryCluster::new().with_secret(tls_secret(&mixed)));
        let generator = Arc::new(CountingGenerator::default());

        let mut config = WebhookConfig::new(cluster.clone(), &opts, generator.clone());
        assert!(config.check_bundle(&mixed).is_err());
        assert!(config.setup_certificate().await.unwrap());
        assert_eq!(generator.issued.load(Ordering::SeqCst), 1);

        let secret = cluster
            .secret("eirini", "eirini-x-setupcertificate")
            .unwrap();
        let stored = bundle_from_secret(&secret).unwrap();
        assert_ne!(stored, mixed);
        assert!(config.check_bundle(&stored).is_ok());
    }

    #[tokio::test]
    async fn certificate_not_signed_by_the_ca_is_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path());
        let (a, b) = two_bundles(&opts);
        let foreign_ca = CertificateBundle {
            ca_certificate: b.ca_certificate,
            ..a
        };
        let cluster = Arc::new(InMemoryCluster::new().with_secret(tls_secret(&foreign_ca)));
        let generator = Arc::new(CountingGenerator::default());

        let mut config = WebhookConfig::new(cluster.clone(), &opts, generator.clone());
        assert!(config.check_bundle(&foreign_ca).is_err());
        assert!(config.setup_certificate().await.unwrap());
        assert_eq!(generator.issued.load(Ordering::SeqCst), 1);
        assert_ne!(config.ca_bundle(), Some(foreign_ca.ca_certificate.as_slice()));
    }

    #[tokio::test]
    async fn configuration_requires_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let config = WebhookConfig::new(
            Arc::new(InMemoryCluster::new()),
            &options(dir.path()),
            Arc::new(InMemoryGenerator),
        );
        assert!(matches!(
            config.build_configuration(&[hook("0")]),
            Err(Error::CertificateProvisioning(_))
        ));
    }

    #[tokio::test]
    async fn configuration_is_created_then_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = Arc::new(InMemoryCluster::new());
        let mut config =
            WebhookConfig::new(cluster.clone(), &options(dir.path()), Arc::new(InMemoryGenerator));
        config.setup_certificate().await.unwrap();

        config
            .generate_webhook_server_config(&[hook("0"), hook("1")])
            .await
            .unwrap();
        let created = cluster
            .webhook_configuration("eirini-x-mutating-hook-eirini")
            .unwrap();
        let webhooks = created.webhooks.unwrap();
        assert_eq!(webhooks.len(), 2);
        assert_eq!(
            webhooks[0].client_config.url.as_deref(),
            Some("https://10.0.0.5:4545/eirini-x-0")
        );
        assert_eq!(webhooks[0].failure_policy.as_deref(), Some("Ignore"));
        assert_eq!(
            webhooks[0].client_config.ca_bundle.as_ref().map(|b| b.0.as_slice()),
            config.ca_bundle()
        );

        config
            .generate_webhook_server_config(&[hook("0")])
            .await
            .unwrap();
        let replaced = cluster
            .webhook_configuration("eirini-x-mutating-hook-eirini")
            .unwrap();
        assert_eq!(replaced.webhooks.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn service_reference_replaces_url() {
        let dir = tempfile::tempdir().unwrap();
        let opts = ManagerOptions {
            service_name: Some("eirini-x-hooks".to_string()),
            ..options(dir.path())
        };
        let mut config =
            WebhookConfig::new(Arc::new(InMemoryCluster::new()), &opts, Arc::new(InMemoryGenerator));
        config.setup_certificate().await.unwrap();

        let built = config.build_configuration(&[hook("0")]).unwrap();
        let client = &built.webhooks.unwrap()[0].client_config;
        assert!(client.url.is_none());
        let service = client.service.as_ref().unwrap();
        assert_eq!(service.name, "eirini-x-hooks");
        assert_eq!(service.namespace, "eirini");
        assert_eq!(service.path.as_deref(), Some("/eirini-x-0"));
        assert_eq!(service.port, Some(4545));
    }
}
