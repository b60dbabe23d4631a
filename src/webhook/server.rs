//! Admission Webhook Server
//!
//! Hosts every registered [`Webhook`] on its own path behind a single TLS
//! listener. Paths are mounted during registration and the router is built
//! once, when the manager starts serving.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::core::DynamicObject;
use opentelemetry::{global, propagation::Extractor};
use serde::Serialize;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::adapter::Webhook;
use crate::error::{Error, Result};
use crate::manager::options::ManagerOptions;

/// In-flight admission requests get this long to finish after shutdown is requested
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

struct HeaderExtractor<'a>(&'a HeaderMap);

impl<'a> Extractor for HeaderExtractor<'a> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v: &HeaderValue| v.to_str().ok())
    }
    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k: &HeaderName| k.as_str()).collect()
    }
}

async fn extract_trace_context(request: Request, next: Next) -> Response {
    let parent_cx = global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor(request.headers()))
    });
    tracing::Span::current().set_parent(parent_cx);
    next.run(request).await
}

/// Install the process-wide rustls crypto provider before any TLS operation
fn install_crypto_provider() -> Result<()> {
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
        && rustls::crypto::CryptoProvider::get_default().is_none()
    {
        return Err(Error::Server(
            "failed to install rustls crypto provider".to_string(),
        ));
    }
    Ok(())
}

/// TLS server hosting the mutating webhooks
pub struct WebhookServer {
    host: String,
    port: u16,
    cert_dir: PathBuf,

    /// Mounted webhooks, in registration order
    routes: RwLock<Vec<(String, Arc<Webhook>)>>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub webhooks: usize,
}

impl WebhookServer {
    pub fn new(options: &ManagerOptions) -> Self {
        Self {
            host: options.host.clone(),
            port: options.port,
            cert_dir: options.cert_dir(),
            routes: RwLock::new(Vec::new()),
        }
    }

    /// Mount a webhook on `path`
    pub async fn register(&self, path: &str, hook: Arc<Webhook>) -> Result<()> {
        let mut routes = self.routes.write().await;
        if routes.iter().any(|(mounted, _)| mounted == path) {
            return Err(Error::Registration(format!(
                "path {path} is already mounted"
            )));
        }
        routes.push((path.to_string(), hook));
        Ok(())
    }

    /// Number of mounted webhooks
    pub async fn registered(&self) -> usize {
        self.routes.read().await.len()
    }

    /// Router with one POST route per mounted webhook plus `/healthz`
    pub async fn router(&self) -> Router {
        let routes = self.routes.read().await;

        let mut router = Router::new().route(
            "/healthz",
            get(health_handler).with_state(routes.len()),
        );
        for (path, hook) in routes.iter() {
            router = router.route(path, post(admit_handler).with_state(Arc::clone(hook)));
        }

        router
            .layer(middleware::from_fn(extract_trace_context))
            .layer(TraceLayer::new_for_http())
    }

    pub fn cert_path(&self) -> PathBuf {
        self.cert_dir.join(crate::certificate::TLS_CERT_KEY)
    }

    pub fn key_path(&self) -> PathBuf {
        self.cert_dir.join(crate::certificate::TLS_KEY_KEY)
    }

    /// Load the TLS material written by the certificate setup
    pub async fn tls_config(&self) -> Result<RustlsConfig> {
        install_crypto_provider()?;
        RustlsConfig::from_pem_file(self.cert_path(), self.key_path())
            .await
            .map_err(|e| Error::Server(format!("loading TLS material: {e}")))
    }

    /// Socket address for the configured host and port
    pub async fn bind_address(&self) -> Result<SocketAddr> {
        if let Ok(ip) = self.host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }
        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| Error::Server(format!("resolving {}: {e}", self.host)))?
            .next()
            .ok_or_else(|| Error::Server(format!("{} did not resolve", self.host)))
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests
    pub async fn serve<F>(&self, tls: RustlsConfig, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.bind_address().await?;
        let app = self.router().await;

        let handle = Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            shutdown.await;
            info!("Shutdown requested, draining admission requests");
            drain.graceful_shutdown(Some(GRACEFUL_SHUTDOWN_TIMEOUT));
        });

        info!(%addr, webhooks = self.registered().await, "Starting webhook server with TLS");

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app.into_make_service())
            .await
            .map_err(|e| Error::Server(format!("serving on {addr}: {e}")))
    }
}

// HTTP Handlers

async fn health_handler(State(webhooks): State<usize>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        webhooks,
    })
}

#[instrument(skip(hook, review), fields(extension = %hook.name()))]
async fn admit_handler(
    State(hook): State<Arc<Webhook>>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> impl IntoResponse {
    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!("Failed to parse admission request: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(
                    AdmissionResponse::invalid(format!("Invalid admission request: {e}"))
                        .into_review(),
                ),
            );
        }
    };

    let response = hook.handle(&request).await;
    info!(
        uid = %request.uid,
        allowed = response.allowed,
        "Admission request handled"
    );

    (StatusCode::OK, Json(response.into_review()))
}
