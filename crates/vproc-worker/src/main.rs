//! Video upload worker binary.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};

use vproc_media::{check_ffmpeg, check_ffprobe, HlsEncoder, Transcoder};
use vproc_queue::JobQueue;
use vproc_status::{StatusClient, StatusReporter};
use vproc_worker::{
    logging, metrics, ControllerConfig, Dispatcher, JobController, JobExecutor, RetryLedger,
    WorkerConfig,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    info!("Starting vproc-worker");

    if let Err(e) = run().await {
        error!("Worker failed: {:#}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

async fn run() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = std::env::var("METRICS_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
    {
        metrics::install_exporter(port).context("failed to start metrics exporter")?;
        info!("Serving Prometheus metrics on port {}", port);
    }

    let queue = Arc::new(JobQueue::from_env().context("failed to create job queue")?);
    let policy = queue.policy();
    config.validate(queue.config().ack_wait)?;
    info!(
        max_retries = policy.max_retries(),
        max_deliver = policy.max_deliver(),
        "Delivery policy"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let encoder = HlsEncoder::from_env();
    for dir in [
        &config.input_root,
        &encoder.config().hls_root,
        &encoder.config().thumbnail_root,
    ] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    if let Err(e) = check_ffmpeg() {
        warn!("{}; every encode will fail until it is installed", e);
    }
    if let Err(e) = check_ffprobe() {
        warn!("{}; durations will be reported as 0", e);
    }

    let transcoder: Arc<dyn Transcoder> = Arc::new(encoder);
    let reporter: Arc<dyn StatusReporter> =
        Arc::new(StatusClient::from_env().context("failed to create status client")?);

    let controller = Arc::new(JobController::new(
        transcoder,
        reporter,
        Arc::new(RetryLedger::new()),
        ControllerConfig::new(&config, policy),
    ));
    let dispatcher = Arc::new(Dispatcher::new(controller, policy, config.heartbeat_interval));
    let executor = JobExecutor::new(config, queue, dispatcher);

    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    executor.run(shutdown_rx).await?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    tokio::signal::ctrl_c().await.ok();
}
