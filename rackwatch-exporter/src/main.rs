// Rackwatch Exporter - Prometheus exporter for rack telemetry
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Rackwatch Exporter
//!
//! Polls server BMCs, power shelves and CDUs on a fixed interval and
//! exposes the results as Prometheus gauges.
//!
//! ## Usage
//!
//! ```bash
//! # Run with the default config file (rackwatch.toml)
//! rackwatch-exporter
//!
//! # Custom config, port and interval
//! rackwatch-exporter --config /etc/rackwatch.toml --port 9105 --interval 30
//! ```

mod collector;
mod metrics;
mod poller;
mod settings;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use clap::Parser;
use collector::{Collector, CollectorState, Sources};
use metrics::{encode_metrics, PrometheusSink};
use poller::HttpPoller;
use rackwatch::{CycleEngine, JsonFileSnapshotSink};
use serde::Serialize;
use settings::{ExporterConfig, ExporterError};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// Rackwatch Prometheus Exporter
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "rackwatch.toml")]
    config: PathBuf,

    /// Port to listen on (overrides exporter.listen)
    #[arg(short, long)]
    port: Option<u16>,

    /// Seconds between poll cycles (overrides exporter.interval_secs)
    #[arg(short, long)]
    interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Application state shared across handlers.
struct AppState {
    collector: Arc<CollectorState>,
    interval_secs: u64,
    start_time: std::time::Instant,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Rackwatch Exporter v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), ExporterError> {
    let mut config = ExporterConfig::load(&args.config)?;
    if let Some(port) = args.port {
        config.exporter.listen.set_port(port);
    }
    if let Some(interval) = args.interval {
        config.exporter.interval_secs = interval;
    }
    config.validate()?;

    info!(
        config = %args.config.display(),
        servers = config.servers.len(),
        power_shelves = config.psus.len(),
        cdus = config.cdu.len(),
        "Configuration loaded"
    );

    let engine = CycleEngine::new(config.exporter.engine.clone())
        .with_exporter_version(env!("CARGO_PKG_VERSION"));
    let poller = Arc::new(HttpPoller::new(&config)?);
    let sources = Sources {
        servers: config.servers.clone(),
        power_shelves: config.psus.clone(),
        cdus: config.cdu.clone(),
    };

    let mut collector = Collector::new(engine, poller, Arc::new(PrometheusSink::new()), sources)
        .with_parallel(config.exporter.parallel);
    if let Some(path) = &config.exporter.snapshot_path {
        info!(path = %path.display(), "Writing sensor snapshots");
        collector = collector.with_snapshot_sink(Arc::new(JsonFileSnapshotSink::new(path)));
    }

    let state = Arc::new(AppState {
        collector: collector.state(),
        interval_secs: config.exporter.interval_secs,
        start_time: std::time::Instant::now(),
    });

    // Start polling in background
    let interval = config.interval();
    tokio::spawn(async move {
        collector.run(interval).await;
    });

    // Build router
    let app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/status", get(status_handler))
        .with_state(state);

    // Start server
    let addr = config.exporter.listen;
    info!("Starting server on http://{}", addr);
    info!("Metrics endpoint: http://{}/metrics", addr);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ExporterError::Bind { addr, source })?;
    axum::serve(listener, app)
        .await
        .map_err(ExporterError::Server)
}

/// Root handler - shows a simple HTML page.
async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Rackwatch Exporter</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 800px; margin: 50px auto; padding: 20px; }
        h1 { color: #2c3e50; }
        a { color: #3498db; text-decoration: none; }
        a:hover { text-decoration: underline; }
        .endpoints { background: #f8f9fa; padding: 20px; border-radius: 8px; margin: 20px 0; }
        .endpoint { margin: 10px 0; }
        code { background: #e9ecef; padding: 2px 6px; border-radius: 4px; }
    </style>
</head>
<body>
    <h1>Rackwatch Exporter</h1>
    <p>Prometheus exporter for rack telemetry: server BMCs, power shelves and coolant distribution units.</p>

    <div class="endpoints">
        <h2>Endpoints</h2>
        <div class="endpoint"><a href="/metrics">/metrics</a> - Prometheus metrics</div>
        <div class="endpoint"><a href="/health">/health</a> - Health check</div>
        <div class="endpoint"><a href="/ready">/ready</a> - Readiness check (first cycle completed)</div>
        <div class="endpoint"><a href="/status">/status</a> - Status information (JSON)</div>
    </div>

    <h2>Metrics</h2>
    <ul>
        <li><code>server_*_temperature_celsius</code> - CPU, memory and GPU temperatures</li>
        <li><code>server_*power_watt</code> - Server power sensors</li>
        <li><code>psu_output_power_watt</code> - Power shelf output</li>
        <li><code>powershelf_psu_fail</code>, <code>powershelf_chassis_fail</code> - PSU and feed health</li>
        <li><code>cdu_temperature_celsius</code>, <code>cdu_pump_metric</code>, <code>cdu_fan_metric</code>, <code>cdu_sensor_metric</code> - CDU readings</li>
        <li><code>cdu_leakage</code> - Leak sensors (confirmed and keep-watching)</li>
        <li><code>cdu_tank_level</code> - Tank level flags</li>
        <li><code>cdu_pump_fail</code>, <code>cdu_fan_fail</code> - Stall detection</li>
        <li><code>cdu_calculated_metric</code> - LPM_W, LPM_C, Heat_CC</li>
        <li><code>rackwatch_source_poll_failed</code> - Endpoint failures after hysteresis</li>
    </ul>
</body>
</html>"#,
    )
}

/// Metrics handler - returns Prometheus text format.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = encode_metrics();
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness check handler.
async fn ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.collector.is_ready() {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Waiting for first poll cycle")
    }
}

/// Status information response.
#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_secs: u64,
    running: bool,
    interval_secs: u64,
    cycles: u64,
    last_cycle_ms: u64,
    last_failed_endpoints: u64,
}

/// Status handler - returns JSON status information.
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let collector = &state.collector;
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        running: collector.running.load(Ordering::SeqCst),
        interval_secs: state.interval_secs,
        cycles: collector.cycles.load(Ordering::SeqCst),
        last_cycle_ms: collector.last_cycle_ms.load(Ordering::SeqCst),
        last_failed_endpoints: collector.last_failed_endpoints.load(Ordering::SeqCst),
    })
}
