//! Manager options
//!
//! Options are a plain snapshot: `ExtensionManager::new` fills in the derived
//! defaults exactly once and the manager never touches them afterwards.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Fingerprint used when none is configured
pub const DEFAULT_OPERATOR_FINGERPRINT: &str = "eirini-x";

/// Default HTTPS port of the webhook server
pub const DEFAULT_WEBHOOK_PORT: u16 = 9443;

/// Default lifetime of generated certificates
pub const DEFAULT_CERT_VALIDITY_DAYS: u32 = 365;

/// Certificates closer than this to expiry are regenerated
pub const DEFAULT_CERT_ROTATION_THRESHOLD_DAYS: u32 = 30;

/// How often the serving manager re-checks its certificate
pub const DEFAULT_CERT_CHECK_INTERVAL: Duration = Duration::from_secs(3600);

/// What the API server does when the webhook cannot be called or errors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Reject the admission request
    #[default]
    Fail,
    /// Admit the object unchanged
    Ignore,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Fail => write!(f, "Fail"),
            FailurePolicy::Ignore => write!(f, "Ignore"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fail" => Ok(FailurePolicy::Fail),
            "ignore" => Ok(FailurePolicy::Ignore),
            other => Err(format!("unknown failure policy {other:?}, expected Fail or Ignore")),
        }
    }
}

/// Runtime options of the extension manager
#[derive(Clone, Debug)]
pub struct ManagerOptions {
    /// Namespace the manager operates in
    pub namespace: String,

    /// Address the API server uses to reach the webhook; the listener binds to it too
    pub host: String,

    /// Listening port
    pub port: u16,

    /// Kubeconfig path. Omit for in-cluster or inferred configuration
    pub kube_config: Option<PathBuf>,

    /// Failure policy written into every generated webhook
    pub failure_policy: FailurePolicy,

    /// Only route Pods labelled as apps (`source_type=APP`) in the labelled namespace
    pub filter_apps: bool,

    /// Unique string identifying this deployment; prefixes every generated name
    pub operator_fingerprint: String,

    /// Name of the certificate secret. Empty means `<fingerprint>-setupcertificate`
    pub setup_certificate_name: String,

    /// Where the serving certificate is written. Defaults to `<tmp>/<fingerprint>-certs`
    pub cert_dir: Option<PathBuf>,

    /// Route the API server through this Service instead of `https://host:port`
    pub service_name: Option<String>,

    /// Register UPDATE in addition to CREATE
    pub register_update: bool,

    pub cert_validity_days: u32,

    pub cert_rotation_threshold_days: u32,

    /// `None` disables the periodic certificate check while serving
    pub cert_check_interval: Option<Duration>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            host: "127.0.0.1".to_string(),
            port: DEFAULT_WEBHOOK_PORT,
            kube_config: None,
            failure_policy: FailurePolicy::default(),
            filter_apps: true,
            operator_fingerprint: DEFAULT_OPERATOR_FINGERPRINT.to_string(),
            setup_certificate_name: String::new(),
            cert_dir: None,
            service_name: None,
            register_update: false,
            cert_validity_days: DEFAULT_CERT_VALIDITY_DAYS,
            cert_rotation_threshold_days: DEFAULT_CERT_ROTATION_THRESHOLD_DAYS,
            cert_check_interval: Some(DEFAULT_CERT_CHECK_INTERVAL),
        }
    }
}

impl ManagerOptions {
    /// Fill in every value derived from the fingerprint
    pub(crate) fn apply_defaults(mut self) -> Self {
        if self.operator_fingerprint.is_empty() {
            self.operator_fingerprint = DEFAULT_OPERATOR_FINGERPRINT.to_string();
        }
        if self.setup_certificate_name.is_empty() {
            self.setup_certificate_name = self.default_setup_certificate_name();
        }
        if self.cert_dir.is_none() {
            self.cert_dir = Some(
                std::env::temp_dir().join(format!("{}-certs", self.operator_fingerprint)),
            );
        }
        self
    }

    /// Label key put on the operator namespace
    pub fn namespace_label(&self) -> String {
        format!("{}-ns", self.operator_fingerprint)
    }

    /// Name of the generated MutatingWebhookConfiguration
    pub fn webhook_config_name(&self) -> String {
        crate::certificate::config_name(&self.operator_fingerprint, &self.namespace)
    }

    fn default_setup_certificate_name(&self) -> String {
        format!("{}-setupcertificate", self.operator_fingerprint)
    }

    /// Certificate directory; only `None` before defaults are applied
    pub fn cert_dir(&self) -> PathBuf {
        self.cert_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(format!("{}-certs", self.operator_fingerprint)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_derived_from_fingerprint() {
        let opts = ManagerOptions {
            operator_fingerprint: String::new(),
            namespace: "eirini".to_string(),
            ..Default::default()
        }
        .apply_defaults();

        assert_eq!(opts.operator_fingerprint, "eirini-x");
        assert_eq!(opts.setup_certificate_name, "eirini-x-setupcertificate");
        assert_eq!(opts.namespace_label(), "eirini-x-ns");
        assert_eq!(opts.webhook_config_name(), "eirini-x-mutating-hook-eirini");
        assert!(opts.cert_dir().ends_with("eirini-x-certs"));
    }

    #[test]
    fn explicit_values_survive_defaulting() {
        let opts = ManagerOptions {
            operator_fingerprint: "volume".to_string(),
            setup_certificate_name: "my-cert".to_string(),
            cert_dir: Some(PathBuf::from("/var/run/certs")),
            ..Default::default()
        }
        .apply_defaults();

        assert_eq!(opts.setup_certificate_name, "my-cert");
        assert_eq!(opts.namespace_label(), "volume-ns");
        assert_eq!(opts.cert_dir(), PathBuf::from("/var/run/certs"));
    }

    #[test]
    fn failure_policy_parses_case_insensitively() {
        assert_eq!("ignore".parse::<FailurePolicy>(), Ok(FailurePolicy::Ignore));
        assert_eq!("Fail".parse::<FailurePolicy>(), Ok(FailurePolicy::Fail));
        assert!("sometimes".parse::<FailurePolicy>().is_err());
        assert_eq!(FailurePolicy::default().to_string(), "Fail");
    }
}
