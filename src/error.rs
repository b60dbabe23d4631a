//! Error types for the extension manager
//!
//! Startup failures (connection, certificate, configuration sync, namespace
//! label, registration) abort `ExtensionManager::start`. Per-request failures
//! never leave the adapter: they are turned into a denied admission response.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Cluster configuration could not be loaded or the API server is unreachable
    #[error("Failed connecting to kubernetes cluster: {0}")]
    Connection(String),

    /// TLS material could not be produced, read or persisted
    #[error("Setting up the webhook server certificate: {0}")]
    CertificateProvisioning(String),

    /// The MutatingWebhookConfiguration could not be created or updated
    #[error("Generating the webhook server configuration {name}: {source}")]
    ConfigurationSync {
        name: String,
        #[source]
        source: kube::Error,
    },

    /// The operator namespace could not be read or relabelled
    #[error("Setting the operator namespace label on {namespace}: {source}")]
    NamespaceLabel {
        namespace: String,
        #[source]
        source: kube::Error,
    },

    /// An adapter was registered without a live server or cluster handle
    #[error("Registering admission webhook: {0}")]
    Registration(String),

    /// The admission request object is not a Pod
    #[error("Decoding pod from admission request: {0}")]
    Decode(String),

    /// The HTTPS listener failed
    #[error("Webhook server error: {0}")]
    Server(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Test".to_string(),
            code,
        })
    }

    #[test]
    fn messages_name_the_failing_step() {
        let err = Error::ConfigurationSync {
            name: "eirini-x-mutating-hook-eirini".to_string(),
            source: api_error(409),
        };
        let msg = err.to_string();
        assert!(msg.contains("eirini-x-mutating-hook-eirini"));
        assert!(msg.contains("boom"));
    }
}
