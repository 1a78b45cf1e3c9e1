//! Logs, traces and Prometheus metrics.
//!
//! Logs always go to stdout. With an OTLP endpoint, logs and spans are also
//! exported over gRPC.

use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics::{Unit, gauge};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use opentelemetry::trace::{Span, Tracer};
use opentelemetry::{KeyValue, global};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const DEFAULT_FILTER: &str = "info,gatehouse=debug";
const PROCESS_REFRESH: Duration = Duration::from_secs(10);
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

fn resource() -> Resource {
    Resource::builder()
        .with_service_name(env!("CARGO_PKG_NAME"))
        .build()
}

/// OTLP providers, flushed on [`Telemetry::shutdown`].
#[derive(Default)]
pub struct Telemetry {
    tracer: Option<SdkTracerProvider>,
    logger: Option<SdkLoggerProvider>,
}

impl Telemetry {
    /// Install the global `tracing` subscriber.
    ///
    /// `RUST_LOG` overrides the default filter.
    pub fn init(otlp_endpoint: Option<&str>) -> Result<Self, BoxError> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let registry = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer());

        let Some(endpoint) = otlp_endpoint else {
            registry.try_init()?;
            return Ok(Self::default());
        };

        let tracer = SdkTracerProvider::builder()
            .with_batch_exporter(
                SpanExporter::builder()
                    .with_tonic()
                    .with_endpoint(endpoint)
                    .build()?,
            )
            .with_resource(resource())
            .build();
        global::set_tracer_provider(tracer.clone());

        let logger = SdkLoggerProvider::builder()
            .with_batch_exporter(
                LogExporter::builder()
                    .with_tonic()
                    .with_endpoint(endpoint)
                    .build()?,
            )
            .with_resource(resource())
            .build();

        registry
            .with(OpenTelemetryTracingBridge::new(&logger))
            .try_init()?;

        Ok(Self {
            tracer: Some(tracer),
            logger: Some(logger),
        })
    }

    /// Flush pending spans and logs.
    pub fn shutdown(self) {
        if let Some(tracer) = self.tracer {
            if let Err(err) = tracer.shutdown() {
                eprintln!("failed to flush traces: {err}");
            }
        }
        if let Some(logger) = self.logger {
            if let Err(err) = logger.shutdown() {
                eprintln!("failed to flush logs: {err}");
            }
        }
    }
}

/// Install the Prometheus recorder and start sampling process usage.
pub fn metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    metrics::describe_counter!(
        "http_requests_total",
        Unit::Count,
        "HTTP requests by method, route and status."
    );
    metrics::describe_histogram!(
        "http_requests_duration_seconds",
        Unit::Seconds,
        "HTTP request latency."
    );
    metrics::describe_counter!(
        "auth_gate_outcomes_total",
        Unit::Count,
        "Requests admitted or rejected by the authentication gate."
    );
    metrics::describe_counter!(
        "tokens_issued_total",
        Unit::Count,
        "Access and refresh tokens signed."
    );
    metrics::describe_gauge!(
        "process_cpu_usage",
        Unit::Percent,
        "CPU usage of the process."
    );
    metrics::describe_gauge!(
        "process_memory_used_bytes",
        Unit::Bytes,
        "Resident memory of the process."
    );

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_requests_duration_seconds".to_owned()),
            LATENCY_BUCKETS,
        )?
        .install_recorder()?;

    tokio::spawn(sample_process());
    Ok(handle)
}

async fn sample_process() {
    let mut system = System::new_with_specifics(RefreshKind::nothing());
    let pid = Pid::from_u32(std::process::id());
    let mut interval = tokio::time::interval(PROCESS_REFRESH);

    loop {
        interval.tick().await;
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory().with_cpu(),
        );

        if let Some(process) = system.process(pid) {
            gauge!("process_memory_used_bytes").set(process.memory() as f64);
            gauge!("process_cpu_usage").set(f64::from(process.cpu_usage()));
        }
    }
}

/// Record a span, a counter and a latency sample per request.
///
/// Paths are labelled by their route template so `/v1/users/@me` and friends
/// keep a bounded cardinality.
pub async fn track(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let method = req.method().to_string();
    let version = format!("{:?}", req.version());

    let mut span = global::tracer("gatehouse-http").start(format!("{method} {route}"));
    let start = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    span.set_attributes([
        KeyValue::new("http.request.method", method.clone()),
        KeyValue::new("http.route", route.clone()),
        KeyValue::new("network.protocol.version", version),
        KeyValue::new("http.response.status_code", status.clone()),
    ]);
    span.end();

    let labels = [("method", method), ("path", route), ("status", status)];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());

    response
}
