//! Logging and tracing setup for binaries embedding the manager
//!
//! Logs go to stdout through `tracing-subscriber`; spans are additionally
//! exported over OTLP when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.

use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{self as sdktrace, Tracer};
use opentelemetry_sdk::{runtime, Resource};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

const SERVICE_NAME: &str = "pod-extension-manager";
const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Flushes pending spans when dropped
#[must_use = "spans are only flushed when the guard is dropped"]
#[derive(Debug, Default)]
pub struct FlushGuard {
    _private: (),
}

impl FlushGuard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        global::shutdown_tracer_provider();
    }
}

fn otlp_tracer(endpoint: &str) -> anyhow::Result<Tracer> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
            KeyValue::new("service.name", SERVICE_NAME),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])))
        .install_batch(runtime::Tokio)?;
    Ok(tracer)
}

/// Install the global subscriber
///
/// Must be called from within a tokio runtime when OTLP export is enabled.
pub fn init_telemetry(json: bool) -> anyhow::Result<FlushGuard> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let fmt_layer = if json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let endpoint = std::env::var(OTLP_ENDPOINT_ENV).ok();
    let otel_layer = match endpoint.as_deref() {
        Some(endpoint) => Some(tracing_opentelemetry::layer().with_tracer(otlp_tracer(endpoint)?)),
        None => None,
    };
    let otel_enabled = otel_layer.is_some();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()?;

    if otel_enabled {
        info!("OpenTelemetry tracing initialized");
    } else {
        info!("OpenTelemetry tracing disabled ({OTLP_ENDPOINT_ENV} not set)");
    }

    Ok(FlushGuard::new())
}
