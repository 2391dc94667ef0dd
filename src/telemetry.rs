//! Logging infrastructure
//!
//! - JSON file logging, rotated daily (for analysis)
//! - Console logging in verbose mode (human-readable, stderr)
//! - Optional OpenTelemetry export (Jaeger, Honeycomb, etc.)

use crate::config::TelemetryConfig;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Keeps log writers alive; hold it for the lifetime of the process
pub struct Telemetry {
    session_id: Uuid,
    log_dir: PathBuf,
    _file_guard: Option<WorkerGuard>,
    otel_provider: Option<SdkTracerProvider>,
}

impl Telemetry {
    /// Install the global subscriber
    pub fn init(config: &TelemetryConfig, otel_endpoint: Option<&str>) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.log_dir)?;

        let session_id = Uuid::new_v4();
        let verbose = config.verbose;

        let file_appender = tracing_appender::rolling::daily(&config.log_dir, "modelscope.log");
        let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

        let make_env_filter = || {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                if verbose {
                    EnvFilter::new("debug,hyper=info,reqwest=info,h2=info,rustls=info")
                } else {
                    EnvFilter::new("info,hyper=warn,reqwest=warn,h2=warn,rustls=warn")
                }
            })
        };

        // Console output goes to stderr so streamed answers on stdout stay clean
        let console = verbose.then(|| {
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact()
        });

        let otel_provider = if let Some(endpoint) = otel_endpoint {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_http()
                .with_endpoint(endpoint)
                .with_protocol(opentelemetry_otlp::Protocol::HttpBinary)
                .build()?;

            let provider = SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_resource(Resource::builder().with_service_name("modelscope").build())
                .build();

            let tracer = provider.tracer("modelscope");
            tracing_subscriber::registry()
                .with(make_env_filter())
                .with(console)
                .with(fmt::layer().json().with_writer(non_blocking))
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init()
                .ok();
            Some(provider)
        } else {
            tracing_subscriber::registry()
                .with(make_env_filter())
                .with(console)
                .with(fmt::layer().json().with_writer(non_blocking))
                .try_init()
                .ok();
            None
        };

        tracing::info!(
            session_id = %session_id,
            log_dir = %config.log_dir.display(),
            otel_enabled = otel_endpoint.is_some(),
            "Telemetry initialized"
        );

        Ok(Self {
            session_id,
            log_dir: config.log_dir.clone(),
            _file_guard: Some(file_guard),
            otel_provider,
        })
    }

    /// Get the current session ID
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Some(provider) = self.otel_provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("Failed to flush OpenTelemetry spans: {}", e);
            }
        }
    }
}
