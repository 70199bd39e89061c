//! Tracing subscriber initialization with structured logging and optional
//! OpenTelemetry trace export.
//!
//! The log format (human-readable or JSON lines) comes from config; the
//! OTel bridge uses a stdout exporter, suitable for local development --
//! swap the exporter for OTLP in production.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use banter_types::config::LogFormat;

use std::sync::OnceLock;

/// Stores the OTel tracer provider so it can be shut down cleanly on exit.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Initialize the global tracing subscriber.
///
/// - Installs a structured `fmt` layer (pretty or JSON per `format`) with
///   target visibility and span close timing.
/// - When `enable_otel` is true, additionally bridges tracing spans to
///   OpenTelemetry via a stdout exporter.
/// - Respects `RUST_LOG` via `EnvFilter::from_default_env()`.
///
/// # Errors
///
/// Returns an error if the global subscriber has already been set.
pub fn init_tracing(format: LogFormat, enable_otel: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::from_default_env();
    let registry = tracing_subscriber::registry().with(env_filter);

    let fmt_layer = || {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
    };

    if enable_otel {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("banter");

        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);

        match format {
            LogFormat::Pretty => registry
                .with(fmt_layer())
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .init(),
            LogFormat::Json => registry
                .with(fmt_layer().json())
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .init(),
        }
    } else {
        match format {
            LogFormat::Pretty => registry.with(fmt_layer()).init(),
            LogFormat::Json => registry.with(fmt_layer().json()).init(),
        }
    }

    Ok(())
}

/// Flush pending traces and shut down the OpenTelemetry tracer provider.
///
/// Safe to call when OTel was not enabled (no-op in that case).
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(err) = provider.shutdown() {
            eprintln!("Warning: OTel tracer provider shutdown error: {err}");
        }
    }
}
