pub mod backend;
pub mod config;
pub mod document;
pub mod metrics;
pub mod mixed;
pub mod op;
pub mod queue;
pub mod replay;
pub mod router;
pub mod worker;
pub mod workload;

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use document::{decode_document, Workload, WorkloadMode, BATCH_QUEUE_CAPACITY};
use mixed::{validate_ratios, MixedGenerator, MixedSettings};
use op::KeyOrder;
use router::RouterStats;
use workload::WorkloadParams;

/// Outcome of one workload run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadSummary {
    pub mode: WorkloadMode,
    /// Operations pushed onto worker queues
    pub dispatched: u64,
    /// Replay batches consumed, zero for mixed workloads
    pub batches: u64,
    /// Operations a mixed workload planned to generate, zero for replay
    pub planned: u64,
    pub router: RouterStats,
}

/// Run the workload described by the document in `source`.
///
/// The document's mode decides between replaying recorded batches and
/// generating a ratio mix. Every operation is routed to a worker queue of
/// `params`; closing the queues and waiting for the workers is left to the
/// caller. Malformed documents fail before anything is dispatched. A replay
/// trace that turns malformed part way through stops dispatch at once. Any
/// failure cancels the run's abort token, so workers drop what is still queued.
pub async fn run_workload<R>(
    source: R,
    mixed: &MixedSettings,
    params: &mut WorkloadParams,
) -> Result<WorkloadSummary>
where
    R: Read + Send + 'static,
{
    let abort = params.abort_token();
    let result = execute_workload(source, mixed, params, &abort).await;
    if result.is_err() {
        abort.cancel();
    }
    result
}

async fn execute_workload<R>(
    source: R,
    mixed: &MixedSettings,
    params: &mut WorkloadParams,
    abort: &CancellationToken,
) -> Result<WorkloadSummary>
where
    R: Read + Send + 'static,
{
    let (workload_tx, workload_rx) = oneshot::channel();
    let decoder = {
        let abort = abort.clone();
        tokio::task::spawn_blocking(move || {
            decode_document(source, workload_tx, BATCH_QUEUE_CAPACITY, &abort)
        })
    };

    let workload = match workload_rx.await {
        Ok(workload) => workload,
        Err(_) => {
            // The decoder gave up before it could tell which mode to run
            decoder.await.context("Workload decoder panicked")??;
            return Err(anyhow!("Workload document does not declare a mode"));
        }
    };

    let dispatched_before = params.dispatched();
    let (mode, batches, planned) = match workload {
        Workload::Replay(batch_rx) => {
            info!("Starting replay workload over {} workers", params.concurrency());
            let stats = match replay::replay(batch_rx, abort, params).await {
                Ok(stats) => stats,
                Err(e) => {
                    if abort.is_cancelled() {
                        // The decoder failed, report its error
                        decoder.await.context("Workload decoder panicked")??;
                    }
                    return Err(e);
                }
            };
            let decoded = decoder.await.context("Workload decoder panicked")??;
            debug!(
                "Decoded {} batches with {} operations",
                decoded.batches, decoded.operations
            );
            (WorkloadMode::Replay, stats.batches, 0)
        }
        Workload::Mixed(entries) => {
            decoder.await.context("Workload decoder panicked")??;
            let planned = generate_requests(&entries, mixed, params).await?;
            (WorkloadMode::Mixed, 0, planned)
        }
    };

    let summary = WorkloadSummary {
        mode,
        dispatched: params.dispatched() - dispatched_before,
        batches,
        planned,
        router: params.router_stats(),
    };
    info!(
        "Workload {} dispatched {} operations (assignment cache: {} keys, {} hits, {} misses)",
        summary.mode,
        summary.dispatched,
        summary.router.cached,
        summary.router.hits,
        summary.router.misses
    );
    Ok(summary)
}

/// Validate a ratio specification and dispatch the operations it generates,
/// each routed by `key + bucket`. Returns the planned operation count.
pub async fn generate_requests(
    entries: &[mixed::RatioEntry],
    settings: &MixedSettings,
    params: &mut WorkloadParams,
) -> Result<u64> {
    let ratios = validate_ratios(entries)?;
    let generator = MixedGenerator::new(ratios, settings.clone());
    let planned = generator.planned_operations();

    info!(
        "Starting mixed workload: {} of {} requested operations in {} cycles over {} workers ({:?} key numbering)",
        planned,
        settings.total_requests,
        generator.cycles(),
        params.concurrency(),
        settings.key_numbering
    );

    for op in generator {
        params.dispatch(op, KeyOrder::KeyFirst).await?;
    }
    Ok(planned)
}
