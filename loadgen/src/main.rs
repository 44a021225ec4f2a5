use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use common::{init_tracing, set_default_rust_log};
use loadgen::backend::{DryRunBackend, StorageBackend};
use loadgen::config::{LoadgenArgs, WorkloadConfig};
use loadgen::metrics::Metrics;
use loadgen::queue::WorkerQueues;
use loadgen::worker::spawn_workers;
use loadgen::workload::WorkloadParams;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    set_default_rust_log("info");
    init_tracing();

    // Parse command line arguments and load configuration
    let args = LoadgenArgs::parse();
    let config = WorkloadConfig::from_args(&args)?;
    info!("Workload configuration: {:#?}", config);

    let workload_file = config
        .workload_file
        .clone()
        .context("A workload file is required (--workload-file or workload_file in the config)")?;
    let file = File::open(&workload_file)
        .with_context(|| format!("Failed to open workload file {:?}", workload_file))?;

    let backend = Arc::new(DryRunBackend::new(
        config.primary_endpoint(),
        config.region.clone(),
        &config.credentials,
    ));
    backend
        .ensure_bucket(&config.bucket)
        .await
        .with_context(|| format!("Unable to create bucket {}", config.bucket))?;

    // Start workers before anything is dispatched so queues drain as they fill
    let (queues, receivers) = WorkerQueues::new(config.concurrency);
    let metrics = Arc::new(Metrics::new());
    spawn_workers(receivers, backend.clone(), metrics.clone());
    info!("Started {} workers", config.concurrency);

    let mut params = WorkloadParams::new(queues, config.credentials.clone());
    params.mark_bucket_ready(&config.bucket);

    let start = Instant::now();
    let summary = loadgen::run_workload(
        BufReader::new(file),
        &config.mixed_settings(),
        &mut params,
    )
    .await?;

    // All operations are queued, let the workers drain
    let tracker = params.finish();
    tracker.wait().await;

    let snapshot = metrics.snapshot(start.elapsed());
    snapshot.show();
    info!(
        "Dispatched {} operations, {} request bytes",
        summary.dispatched,
        backend.bytes_sent()
    );
    println!("{}", snapshot.to_json());

    Ok(())
}
