//! Prompt Gateway - Main entry point
//!
//! This binary loads configuration, wires the orchestrator and runs the HTTP
//! server with all routes and middleware.

use anyhow::Result;
use chrono::Local;
use prompt_gateway::{
    build_router,
    core::{init_metrics, AppConfig},
    services::create_http_client,
    AppState, Orchestrator,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Load .env file if present (before reading any environment variables)
    dotenvy::dotenv().ok();

    // Detect optimal worker threads from environment or cgroup
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .or_else(detect_cpu_limit)
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(worker_threads))
}

/// Custom time formatter that uses local timezone (respects TZ environment variable)
struct LocalTime;

impl tracing_subscriber::fmt::time::FormatTime for LocalTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S"))
    }
}

fn init_tracing() {
    // NO_COLOR disables ANSI codes, for logging to a file
    let no_color = std::env::var("NO_COLOR").is_ok();

    // Noise filters are always appended so a bare RUST_LOG=trace cannot
    // re-enable hyper's per-chunk logging.
    let base_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,prompt_gateway=debug".to_string());
    let filter = tracing_subscriber::EnvFilter::new(format!(
        "{},hyper=warn,hyper::proto=warn,h2=warn,reqwest=warn",
        base_filter
    ));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTime)
                .with_ansi(!no_color),
        )
        .init();
}

async fn async_main(worker_threads: usize) -> Result<()> {
    init_tracing();
    init_metrics();

    tracing::info!("Tokio runtime: using {} worker threads", worker_threads);

    let config = match std::env::var("CONFIG_PATH") {
        Ok(path) => {
            tracing::info!("Loading configuration from {}", path);
            AppConfig::load(&path)?
        }
        Err(_) => {
            tracing::info!("CONFIG_PATH not set, using defaults and environment");
            AppConfig::from_env()
        }
    };

    if config.remote.api_key.is_empty() {
        tracing::warn!("OPENAI_API_KEY is not set; remote text and image routes will fail");
    }

    let http_client = create_http_client(&config)?;
    let orchestrator = Orchestrator::from_config(&config, http_client)?;
    orchestrator.router().log_routes();

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let document_root = config.storage.document_root.display().to_string();
    let data_dir = config.storage.data_dir.display().to_string();

    let app = build_router(Arc::new(AppState::new(config, orchestrator)));

    tracing::info!("Starting Prompt Gateway on {}", addr);
    tracing::info!("Generation: /api/ai/stream, /api/ai/generate");
    tracing::info!("Storage: /api/fs/*, /api/session/* (data dir {})", data_dir);
    tracing::info!("Static files: {}", document_root);
    tracing::info!("Swagger UI: /swagger-ui");
    tracing::info!("Metrics endpoint: /metrics");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Detect CPU limit from cgroup (for containerized environments)
fn detect_cpu_limit() -> Option<usize> {
    // Try cgroup v2 first
    if let Ok(max) = std::fs::read_to_string("/sys/fs/cgroup/cpu.max") {
        if let Some(cores) = parse_cgroup_v2(&max) {
            return Some(cores);
        }
    }

    // Fallback to cgroup v1
    let quota = read_i64("/sys/fs/cgroup/cpu/cpu.cfs_quota_us")?;
    let period = read_i64("/sys/fs/cgroup/cpu/cpu.cfs_period_us")?;
    cores_from_quota(quota, period)
}

fn read_i64(path: &str) -> Option<i64> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Parse `cpu.max` ("<quota> <period>" or "max <period>").
fn parse_cgroup_v2(contents: &str) -> Option<usize> {
    let mut parts = contents.split_whitespace();
    let quota = parts.next()?.parse::<i64>().ok()?;
    let period = parts.next()?.parse::<i64>().ok()?;
    cores_from_quota(quota, period)
}

fn cores_from_quota(quota: i64, period: i64) -> Option<usize> {
    if quota > 0 && period > 0 {
        Some(((quota as f64 / period as f64).ceil() as usize).max(1))
    } else {
        None
    }
}
