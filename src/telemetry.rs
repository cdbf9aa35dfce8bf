//! Tracing subscriber setup
//!
//! Logs go to stdout as text or JSON, filtered by `RUST_LOG` (default
//! `info`). When `OTEL_EXPORTER_OTLP_ENDPOINT` is set, spans are also
//! exported over OTLP/gRPC.

use opentelemetry_otlp::WithExportConfig;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

use crate::config::LogFormat;
use crate::error::{Error, Result};

const SERVICE_NAME: &str = "pg-failover-operator";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn fmt_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Text => fmt::layer().with_target(true).boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
    }
}

fn otel_layer(endpoint: &str) -> Result<BoxedLayer> {
    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(opentelemetry_sdk::trace::config().with_resource(
            opentelemetry_sdk::Resource::new(vec![opentelemetry::KeyValue::new(
                "service.name",
                SERVICE_NAME,
            )]),
        ))
        .install_batch(opentelemetry_sdk::runtime::Tokio)
        .map_err(|e| Error::ConfigError(format!("failed to install OTLP pipeline: {e}")))?;

    Ok(tracing_opentelemetry::layer().with_tracer(tracer).boxed())
}

/// Install the global subscriber. Call once, inside the tokio runtime.
pub fn init_tracing(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();
    let mut layers = vec![fmt_layer(format)];
    if let Some(endpoint) = endpoint.as_deref() {
        layers.push(otel_layer(endpoint)?);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| Error::ConfigError(format!("failed to install subscriber: {e}")))?;

    match endpoint {
        Some(endpoint) => info!("OpenTelemetry tracing enabled, exporting to {}", endpoint),
        None => info!("OpenTelemetry tracing disabled (OTEL_EXPORTER_OTLP_ENDPOINT not set)"),
    }
    Ok(())
}

/// Flush pending spans before exit
pub fn shutdown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
}
