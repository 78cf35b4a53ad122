use crate::cli::ServeArgs;
use crate::infra::{directory_from_snapshots, load_snapshots, AppState, Services};
use crate::jobs::{JobRunner, JobState};
use crate::routes::with_api_routes;
use crate::scheduler;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use seatwatch::config::AppConfig;
use seatwatch::error::AppError;
use seatwatch::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let snapshots = load_snapshots(config.jobs.snapshot_seed.as_deref())?;
    let directory = directory_from_snapshots(&snapshots);
    let services = Services::in_memory(snapshots, directory);

    let runner = Arc::new(JobRunner::new(
        services.detector.clone(),
        services.dispatcher.clone(),
        services.events.clone(),
        config.jobs.detect_budget,
    ));
    if config.jobs.job_token.is_none() {
        warn!("JOB_TOKEN is not set; manual job triggers will answer 503");
    }
    let jobs = JobState {
        runner: runner.clone(),
        job_token: config.jobs.job_token.clone(),
    };

    let app = with_api_routes(&services, jobs)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    scheduler::spawn(
        runner,
        config.jobs.detect_interval,
        config.jobs.receipt_interval,
    );
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        snapshots = services.snapshots.len(),
        "seatwatch api ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
