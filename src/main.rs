#![forbid(unsafe_code)]

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::path::PathBuf;
use std::process::ExitCode;

use axum::routing::get;
use gatehouse::config::Configuration;
use gatehouse::telemetry::{self, Telemetry};
use gatehouse::{app, initialize_state};
use tokio::net::TcpListener;
use tokio::signal;

const CONFIG_PATH_ENV: &str = "CONFIG_PATH";
const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

#[tokio::main]
async fn main() -> ExitCode {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    dotenvy::dotenv().ok();

    let guard = match Telemetry::init(std::env::var(OTLP_ENDPOINT_ENV).ok().as_deref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("failed to initialize telemetry: {err}");
            return ExitCode::FAILURE;
        },
    };

    // Read configuration file.
    let config = match Configuration::load(std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from)) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            return ExitCode::FAILURE;
        },
    };

    // Missing signing secrets abort startup.
    let state = match initialize_state(config.clone()) {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(error = %err, "failed to initialize state");
            return ExitCode::FAILURE;
        },
    };

    let metrics = match telemetry::metrics_recorder() {
        Ok(handle) => handle,
        Err(err) => {
            tracing::error!(error = %err, "failed to install metrics recorder");
            return ExitCode::FAILURE;
        },
    };

    let app = app(state).route("/metrics", get(move || std::future::ready(metrics.render())));

    let listener = match TcpListener::bind(&config.address).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(address = %config.address, error = %err, "failed to bind");
            return ExitCode::FAILURE;
        },
    };
    tracing::info!(address = %config.address, version = %config.version, "server started");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    let code = match result {
        Ok(()) => {
            tracing::info!("server stopped");
            ExitCode::SUCCESS
        },
        Err(err) => {
            tracing::error!(error = %err, "server error");
            ExitCode::FAILURE
        },
    };

    guard.shutdown();
    code
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
