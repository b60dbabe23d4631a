//! Certificate generation
//!
//! The lifecycle code in [`super::WebhookConfig`] only orchestrates; the key
//! and certificate material come from a [`CertificateGenerator`]. The default
//! [`InMemoryGenerator`] issues a throwaway CA and a server certificate signed
//! by it, entirely in memory.

use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose,
};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::error::{Error, Result};

/// What to issue
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateRequest {
    pub common_name: String,
    /// DNS names or IP addresses the certificate must cover
    pub alternative_names: Vec<String>,
    pub validity_days: u32,
}

/// PEM encoded material
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateBundle {
    pub certificate: Vec<u8>,
    pub private_key: Vec<u8>,
    /// CA the API server uses to trust `certificate`
    pub ca_certificate: Vec<u8>,
}

/// Produces TLS material for the webhook server
pub trait CertificateGenerator: Send + Sync {
    fn generate_certificate(&self, request: &CertificateRequest) -> Result<CertificateBundle>;
}

/// rcgen backed generator: self-signed CA plus CA-signed server certificate
#[derive(Clone, Copy, Debug, Default)]
pub struct InMemoryGenerator;

fn rcgen_error(e: rcgen::Error) -> Error {
    Error::CertificateProvisioning(e.to_string())
}

impl CertificateGenerator for InMemoryGenerator {
    fn generate_certificate(&self, request: &CertificateRequest) -> Result<CertificateBundle> {
        let now = OffsetDateTime::now_utc();
        let not_after = now + Duration::days(i64::from(request.validity_days));

        let ca_key = KeyPair::generate().map_err(rcgen_error)?;
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).map_err(rcgen_error)?;
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, format!("{}-ca", request.common_name));
        ca_params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
        ];
        ca_params.not_before = now;
        ca_params.not_after = not_after;
        let ca_cert = ca_params.self_signed(&ca_key).map_err(rcgen_error)?;

        let key = KeyPair::generate().map_err(rcgen_error)?;
        let mut params =
            CertificateParams::new(request.alternative_names.clone()).map_err(rcgen_error)?;
        params
            .distinguished_name
            .push(DnType::CommonName, request.common_name.clone());
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.not_before = now;
        params.not_after = not_after;
        let cert = params
            .signed_by(&key, &ca_cert, &ca_key)
            .map_err(rcgen_error)?;

        debug!(
            common_name = %request.common_name,
            names = ?request.alternative_names,
            "Issued webhook server certificate"
        );

        Ok(CertificateBundle {
            certificate: cert.pem().into_bytes(),
            private_key: key.serialize_pem().into_bytes(),
            ca_certificate: ca_cert.pem().into_bytes(),
        })
    }
}
